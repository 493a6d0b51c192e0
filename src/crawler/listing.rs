//! Listing URL collection
//!
//! The marketplace search page loads more results as it is scrolled. The
//! collector scrolls until the document stops growing and then reads every
//! result card from the rendered DOM.

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::crawler::wait::wait_for;
use crate::url::resolve_link;
use crate::{HarvestError, Result};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A search result card linking to a listing page
pub const LISTING_CARD: &str = "a.gallery-item-card-container";

/// Scrolls the configured search page to its end and returns the listing URLs
pub async fn collect_listing_urls(
    session: &dyn BrowserSession,
    config: &Config,
) -> Result<Vec<String>> {
    let search_url = &config.marketplace.search_url;
    let base = Url::parse(search_url).map_err(|e| crate::UrlError::Parse(e.to_string()))?;

    tracing::info!("Collecting listing URLs from {}", search_url);
    session.navigate(search_url).await?;

    let mut height = 0;
    let mut scrolls = 0u64;
    loop {
        let grown = wait_for(
            config.marketplace.scroll_timeout(),
            config.browser.poll_interval(),
            || async {
                let new_height = session.scroll_to_end().await.ok()?;
                (new_height > height).then_some(new_height)
            },
        )
        .await;

        match grown {
            Ok(new_height) => height = new_height,
            Err(e) => {
                tracing::debug!("Search page stopped growing at {}px ({})", height, e);
                break;
            }
        }

        scrolls += 1;
        if scrolls % 10 == 0 {
            tracing::info!("Scrolled {} times, page height {}px", scrolls, height);
        }
    }

    let html = session.rendered_html().await?;
    let urls = extract_listing_urls(&html, &base)?;
    tracing::info!("Collected {} listing URLs", urls.len());
    Ok(urls)
}

/// Reads the result cards of a rendered search page
///
/// Links are resolved against `base` and deduplicated, keeping page order.
pub fn extract_listing_urls(html: &str, base: &Url) -> Result<Vec<String>> {
    let selector = Selector::parse(LISTING_CARD)
        .map_err(|e| HarvestError::Selector(format!("{}: {:?}", LISTING_CARD, e)))?;
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    Ok(document
        .select(&selector)
        .filter_map(|card| card.value().attr("href"))
        .filter_map(|href| resolve_link(href, base))
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

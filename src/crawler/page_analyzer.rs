//! Listing page scraping
//!
//! The marketplace renders listings client-side, so the page is polled until
//! the category/tag links appear and the rendered DOM is then parsed with
//! `scraper`.

use crate::browser::BrowserSession;
use crate::config::BrowserConfig;
use crate::crawler::wait::wait_for;
use crate::output::MetadataRecord;
use crate::{HarvestError, Result};
use scraper::{ElementRef, Html, Selector};

/// Category and tag links; their presence means the listing has rendered
pub const LOADED_MARKER: &str = "a.meta-data-list-link";

const NAME: &str = "span.ux-item-name";
const AUTHOR: &str = "a.ux-item-publisher-link";
const VERIFIED: &str = "div.verified-domain-icon";
const INSTALLS: &str = "span.installs-text";
const RATING_COUNT: &str = "span.ux-item-rating-count";
const AVERAGE_RATING: &str = "span.ux-item-review-rating";
const DESCRIPTION: &str = "div.ux-item-shortdesc";
const PRICE: &str = "span.item-price-category";
const REPOSITORY_TEXT: &str = "Repository";

/// Scrapes the listing at `url`
///
/// A listing without category or tag links never shows the marker; once the
/// page-load timeout has passed the last rendered DOM is parsed anyway and
/// missing required fields surface as errors.
pub async fn analyze(
    session: &dyn BrowserSession,
    url: &str,
    browser: &BrowserConfig,
) -> Result<MetadataRecord> {
    session.navigate(url).await?;

    let loaded = wait_for(browser.page_load_timeout(), browser.poll_interval(), || async {
        let html = session.rendered_html().await.ok()?;
        has_marker(&html).then_some(html)
    })
    .await;

    let html = match loaded {
        Ok(html) => html,
        Err(e) => {
            tracing::debug!(
                "{} never rendered {} ({}), parsing anyway",
                url,
                LOADED_MARKER,
                e
            );
            session.rendered_html().await?
        }
    };

    extract_metadata(&html, url)
}

fn has_marker(html: &str) -> bool {
    match Selector::parse(LOADED_MARKER) {
        Ok(marker) => Html::parse_document(html).select(&marker).next().is_some(),
        Err(_) => false,
    }
}

/// Extracts a [`MetadataRecord`] from rendered listing HTML
///
/// # Example
///
/// ```
/// use theme_harvester::crawler::extract_metadata;
///
/// let html = r#"<html><body>
///   <span class="ux-item-name">Dracula Official</span>
///   <a class="ux-item-publisher-link">Dracula Theme</a>
///   <span class="installs-text"> 5,123,456 installs</span>
///   <span class="ux-item-rating-count">(321)</span>
///   <span class="ux-item-review-rating" title="Average rating: 4.8 out of 5"></span>
///   <div class="ux-item-shortdesc">Official Dracula Theme</div>
///   <span class="item-price-category">Free</span>
/// </body></html>"#;
///
/// let record = extract_metadata(html, "https://example.com/items?itemName=dracula").unwrap();
/// assert_eq!(record.install_count, 5_123_456);
/// assert_eq!(record.rating_count, 321);
/// assert_eq!(record.average_rating, 4.8);
/// ```
pub fn extract_metadata(html: &str, url: &str) -> Result<MetadataRecord> {
    let document = Html::parse_document(html);
    let page = ListingPage {
        document: &document,
        url,
    };

    let install_count = match page.first(INSTALLS)? {
        Some(element) => parse_count(&page, "installCount", &text_of(element))?,
        None => 0,
    };

    let rating_count = parse_count(&page, "ratingCount", &page.required_text(RATING_COUNT)?)?;

    let rating_title = page
        .required(AVERAGE_RATING)?
        .value()
        .attr("title")
        .unwrap_or_default();
    let average_rating =
        parse_rating(rating_title).ok_or_else(|| page.malformed("averageRating", rating_title))?;

    let mut categories = Vec::new();
    let mut tags = Vec::new();
    for link in page.all(LOADED_MARKER)? {
        let label = link.value().attr("aria-label").unwrap_or_default();
        if label.contains("Category") {
            categories.push(text_of(link));
        }
        if label.contains("Tag") {
            tags.push(text_of(link));
        }
    }

    let repository_url = page
        .all("a")?
        .into_iter()
        .find(|link| text_of(*link) == REPOSITORY_TEXT)
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string);

    Ok(MetadataRecord {
        url: url.to_string(),
        name: page.required_text(NAME)?,
        author: page.required_text(AUTHOR)?,
        verified: page.first(VERIFIED)?.is_some(),
        install_count,
        rating_count,
        average_rating,
        description: page.required_text(DESCRIPTION)?,
        price: page.required_text(PRICE)?,
        categories,
        tags,
        repository_url,
    })
}

struct ListingPage<'a> {
    document: &'a Html,
    url: &'a str,
}

impl<'a> ListingPage<'a> {
    fn all(&self, css: &str) -> Result<Vec<ElementRef<'a>>> {
        let selector = Selector::parse(css)
            .map_err(|e| HarvestError::Selector(format!("{}: {:?}", css, e)))?;
        Ok(self.document.select(&selector).collect())
    }

    fn first(&self, css: &str) -> Result<Option<ElementRef<'a>>> {
        Ok(self.all(css)?.into_iter().next())
    }

    fn required(&self, css: &str) -> Result<ElementRef<'a>> {
        self.first(css)?.ok_or_else(|| HarvestError::MissingElement {
            url: self.url.to_string(),
            selector: css.to_string(),
        })
    }

    fn required_text(&self, css: &str) -> Result<String> {
        Ok(text_of(self.required(css)?))
    }

    fn malformed(&self, field: &'static str, value: &str) -> HarvestError {
        HarvestError::MalformedField {
            url: self.url.to_string(),
            field,
            value: value.to_string(),
        }
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Keeps only the digits, so `"1,234 installs"` and `"(56)"` both parse
fn parse_count(page: &ListingPage<'_>, field: &'static str, text: &str) -> Result<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().map_err(|_| page.malformed(field, text))
}

fn parse_rating(title: &str) -> Option<f64> {
    title
        .replace("Average rating:", "")
        .replace("out of 5", "")
        .trim()
        .parse()
        .ok()
}

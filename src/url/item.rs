use crate::{UrlError, UrlResult};
use url::Url;

/// Query parameter that identifies a marketplace item
const ITEM_NAME_PARAM: &str = "itemName";

/// Extracts the `publisher.extension` identifier from a listing URL
///
/// Downloaded archives are named `{itemName}-{version}.vsix`, so the
/// identifier doubles as the prefix of the expected artifact file.
///
/// # Examples
///
/// ```
/// use theme_harvester::url::extract_item_name;
///
/// let name = extract_item_name(
///     "https://marketplace.visualstudio.com/items?itemName=dracula-theme.theme-dracula",
/// )
/// .unwrap();
/// assert_eq!(name, "dracula-theme.theme-dracula");
/// ```
pub fn extract_item_name(listing_url: &str) -> UrlResult<String> {
    let url = Url::parse(listing_url).map_err(|e| UrlError::Parse(e.to_string()))?;

    url.query_pairs()
        .find(|(key, _)| key == ITEM_NAME_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| UrlError::MissingItemName(listing_url.to_string()))
}

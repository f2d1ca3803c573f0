//! Listing URL normalisation for per-source deduplication.
//!
//! Catalogues often emit the same product card twice on one results page
//! (a "featured" block and the main grid) with different tracking
//! parameters or fragments. Normalising the link lets those compare equal.

use url::Url;

/// Tracking and analytics query parameters removed during normalisation.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "yclid",
    "gclid",
    "fbclid",
    "_openstat",
    "from",
    "roistat",
];

/// Normalise a listing URL for deduplication comparison.
///
/// 1. Lowercase scheme and host (path is preserved as-is).
/// 2. Remove default ports (`:80` for HTTP, `:443` for HTTPS).
/// 3. Remove the trailing slash from the path (unless the path is `"/"`).
/// 4. Strip tracking parameters and sort the rest by key.
/// 5. Remove the fragment.
///
/// Relative or otherwise unparseable links are returned trimmed but
/// otherwise unchanged.
///
/// # Examples
///
/// ```
/// use procura_search::orchestrator::url_normalize::normalize_url;
///
/// let a = normalize_url("https://Gudvin.RU/catalog/stakan/?utm_source=ya&sku=1#reviews");
/// let b = normalize_url("https://gudvin.ru/catalog/stakan?sku=1");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    if is_default_port(&parsed) {
        let _ = parsed.set_port(None);
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    parsed.to_string()
}

fn is_default_port(url: &Url) -> bool {
    matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_but_not_path() {
        assert_eq!(
            normalize_url("HTTPS://Hozka.RU/Catalog/Item"),
            "https://hozka.ru/Catalog/Item"
        );
    }

    #[test]
    fn removes_trailing_slash_and_keeps_root() {
        assert_eq!(
            normalize_url("https://hozka.ru/item/"),
            "https://hozka.ru/item"
        );
        assert_eq!(normalize_url("https://hozka.ru/"), "https://hozka.ru/");
    }

    #[test]
    fn removes_default_ports_only() {
        assert_eq!(
            normalize_url("http://shop.ru:80/p"),
            "http://shop.ru/p"
        );
        assert_eq!(
            normalize_url("https://shop.ru:8443/p"),
            "https://shop.ru:8443/p"
        );
    }

    #[test]
    fn strips_tracking_and_sorts_params() {
        assert_eq!(
            normalize_url("https://shop.ru/p?yclid=9&z=1&from=main&a=2&UTM_SOURCE=x"),
            "https://shop.ru/p?a=2&z=1"
        );
    }

    #[test]
    fn removes_fragment() {
        assert_eq!(
            normalize_url("https://shop.ru/p#tab-reviews"),
            "https://shop.ru/p"
        );
    }

    #[test]
    fn relative_links_pass_through() {
        assert_eq!(normalize_url(" /product/42 "), "/product/42");
        assert_eq!(normalize_url(""), "");
    }
}

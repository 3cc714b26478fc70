//! Realtime feed catalog.
//!
//! The transit operator splits its realtime data across a fixed set of
//! feeds, one per route group. Keys here are the short group names the
//! rest of the crate uses; URLs are derived from the shared base endpoint.

use std::collections::BTreeMap;

/// Base URL for the operator's GTFS-RT endpoints.
pub const FEED_BASE_URL: &str =
    "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs";

/// URL path suffix for a feed key. The numbered-line feed lives at the
/// bare base URL.
fn feed_suffix(key: &str) -> Option<&'static str> {
    match key {
        "1234567" => Some(""),
        "ace" => Some("-ace"),
        "bdfm" => Some("-bdfm"),
        "g" => Some("-g"),
        "jz" => Some("-jz"),
        "nqrw" => Some("-nqrw"),
        "l" => Some("-l"),
        "si" => Some("-si"),
        _ => None,
    }
}

/// Full feed URL for a known feed key.
pub fn feed_url(key: &str) -> Option<String> {
    feed_suffix(key).map(|suffix| format!("{FEED_BASE_URL}{suffix}"))
}

/// Every configured feed, keyed by group name. `BTreeMap` keeps cross-feed
/// iteration order stable, which derived views rely on.
pub fn default_catalog() -> BTreeMap<String, String> {
    ["1234567", "ace", "bdfm", "g", "jz", "l", "nqrw", "si"]
        .into_iter()
        .map(|key| {
            let url = feed_url(key).expect("catalog key must be known");
            (key.to_string(), url)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_url_known_keys() {
        assert_eq!(
            feed_url("ace").as_deref(),
            Some("https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs-ace")
        );
        assert_eq!(
            feed_url("1234567").as_deref(),
            Some("https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs")
        );
        assert_eq!(
            feed_url("si").as_deref(),
            Some("https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs-si")
        );
    }

    #[test]
    fn test_feed_url_unknown_key() {
        assert_eq!(feed_url("x"), None);
    }

    #[test]
    fn test_default_catalog_complete_and_ordered() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 8);
        let keys: Vec<_> = catalog.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["1234567", "ace", "bdfm", "g", "jz", "l", "nqrw", "si"]
        );
        for url in catalog.values() {
            assert!(url.starts_with(FEED_BASE_URL));
        }
    }
}

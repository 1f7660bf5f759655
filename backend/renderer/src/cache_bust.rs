//! Cache-bust URL rewriting for reloads.

use url::Url;

/// Query parameter appended on cache-busted reloads.
pub const CACHE_BUST_PARAM: &str = "hb_ts";

/// Paths ending in this suffix are never cache-busted: their query string is
/// the dashboard's project selector and must stay byte-identical.
const CACHE_BUST_EXEMPT_SUFFIX: &str = "/vis/index.html";

/// Rewrite a view URL for reload. With cache busting enabled and a
/// non-exempt path, the `hb_ts` parameter is added (or replaced) with the
/// current timestamp; otherwise the URL passes through unchanged.
pub fn cache_busted_url(raw: &str, now_ms: i64, enabled: bool) -> String {
    if !enabled {
        return raw.to_string();
    }
    let Ok(mut url) = Url::parse(raw) else {
        // Unparsable URLs pass through; navigation will fail and get logged.
        return raw.to_string();
    };
    if url
        .path()
        .to_ascii_lowercase()
        .ends_with(CACHE_BUST_EXEMPT_SUFFIX)
    {
        return raw.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != CACHE_BUST_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(CACHE_BUST_PARAM, &now_ms.to_string());
    }
    url.to_string()
}

/// Remove the cache-bust parameter, for comparing a page's current URL with
/// its view URL.
pub fn strip_cache_bust(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(k, _)| k == CACHE_BUST_PARAM) {
        return raw.to_string();
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != CACHE_BUST_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
    }
    url.to_string()
}

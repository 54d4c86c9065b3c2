//! Per-source request headers for page and cover fetches.

use std::collections::HashMap;

const BASIC_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Header templates keyed by source type tag. Several tags may share a row.
const SOURCE_HEADERS: &[(&[&str], &[(&str, &str)])] = &[
    (
        &["picacg"],
        &[
            ("User-Agent", BASIC_USER_AGENT),
            ("Referer", "https://www.picacomic.com/"),
        ],
    ),
    (
        &["jm"],
        &[
            ("User-Agent", CHROME_USER_AGENT),
            ("Referer", "https://18comic.vip/"),
            (
                "Accept",
                "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
            ),
            ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
            ("Sec-Fetch-Dest", "image"),
            ("Sec-Fetch-Mode", "no-cors"),
            ("Sec-Fetch-Site", "cross-site"),
        ],
    ),
    (
        &["ehentai"],
        &[
            ("User-Agent", CHROME_USER_AGENT),
            ("Referer", "https://e-hentai.org/"),
        ],
    ),
    (
        &["hitomi"],
        &[
            ("User-Agent", CHROME_USER_AGENT),
            ("Referer", "https://hitomi.la/"),
        ],
    ),
    (
        &["nhentai"],
        &[
            ("User-Agent", BASIC_USER_AGENT),
            ("Referer", "https://nhentai.net/"),
        ],
    ),
    (
        &["htmanga", "htManga"],
        &[
            ("User-Agent", BASIC_USER_AGENT),
            ("Referer", "https://htmanga.com/"),
        ],
    ),
];

const DEFAULT_HEADERS: &[(&str, &str)] = &[("User-Agent", BASIC_USER_AGENT)];

/// Default headers for fetching images of the given source type.
pub fn headers_for_source(source_type: &str) -> HashMap<String, String> {
    let template = SOURCE_HEADERS
        .iter()
        .find(|(tags, _)| tags.iter().any(|tag| *tag == source_type))
        .map(|(_, headers)| *headers)
        .unwrap_or(DEFAULT_HEADERS);

    template
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Headers for one episode: the episode's own set when non-empty, otherwise
/// the source defaults. A User-Agent is always present.
pub fn resolve_episode_headers(
    source_defaults: &HashMap<String, String>,
    episode_headers: Option<&HashMap<String, String>>,
) -> HashMap<String, String> {
    let mut headers = match episode_headers {
        Some(h) if !h.is_empty() => h.clone(),
        _ => source_defaults.clone(),
    };
    if !headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
        headers.insert("User-Agent".to_string(), BASIC_USER_AGENT.to_string());
    }
    headers
}

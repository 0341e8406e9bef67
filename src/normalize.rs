//! URL normalization: reduces arbitrary YouTube URL forms to the canonical
//! `watch?v=<id>` form.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

// Video ids are exactly 11 characters from this alphabet.
static SHORT_LINK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"youtu\.be/([0-9A-Za-z_-]{11})").unwrap());

/// Extracts the video id from the input and returns the canonical watch URL,
/// or `None` when the input is not a recognized video URL.
///
/// Recognition order: a `v` query parameter first, then an 11-character id
/// after a `youtu.be/` path segment. Pure function, no network access.
pub fn canonical_watch_url(input: &str) -> Option<String> {
    let from_query = Url::parse(input).ok().and_then(|parsed| {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty())
    });

    let id = from_query
        .or_else(|| SHORT_LINK_ID.captures(input).map(|caps| caps[1].to_string()))?;

    Some(format!("https://www.youtube.com/watch?v={id}"))
}

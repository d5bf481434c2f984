pub mod app_tokens;
pub mod application;
pub mod cache;
pub mod client;
pub mod collections;
pub mod models;
pub mod purpose;
pub mod token_manager;

pub use client::GithubClient;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};

pub const USER_AGENT_VALUE: &str = "orgportal";
pub const API_VERSION: &str = "2022-11-28";

/// Error bodies are truncated to this many bytes before they land in an error.
pub(crate) const API_ERROR_BODY_LIMIT: usize = 512;

pub(crate) fn truncate_error_body(mut body: String) -> String {
    if body.len() > API_ERROR_BODY_LIMIT {
        let mut end = API_ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

pub(crate) fn github_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
    headers
}

/// Extracts the `rel="next"` target from a `Link` header.
pub(crate) fn next_page_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

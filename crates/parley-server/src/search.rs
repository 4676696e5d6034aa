//! Search delegation — a stateless pass-through that turns a query into a
//! search-engine redirect URL.

const SEARCH_PREFIX: &str = "https://www.google.com/search?q=";

/// Build the redirect URL for a raw query string.
pub fn redirect_url(query: &str) -> String {
    format!("{SEARCH_PREFIX}{query}")
}

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// OLX country sites a subscriber may point a session at
const OLX_URL_PATTERN: &str =
    r"^(https?://)?(www\.)?olx\.(ua|pl|bg|ro|pt|com|co\.za|com\.br|com\.pk|lt|lv|hr|kz|uz|by|md|az)/.*$";

fn olx_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(OLX_URL_PATTERN).expect("OLX URL pattern is valid"))
}

/// Accepts absolute URLs on a known OLX domain
pub fn is_valid_url(text: &str) -> bool {
    olx_pattern().is_match(text) && Url::parse(text).is_ok()
}

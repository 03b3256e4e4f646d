use std::fmt;

/// Site root that relative listing paths are joined onto
pub const OLX_BASE_URL: &str = "https://www.olx.ua";

/// Telegram user a polling session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The most recent organic listing read from a search page.
///
/// Every field is plain text and defaults to empty; a listing is either
/// filled from a matched card or left as `Listing::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub title: String,
    /// One or more image URLs separated by `;`
    pub image: String,
    pub price: String,
    pub city: String,
    /// Detail page path, usually relative to the site root
    pub href: String,
    /// Time of day the listing was published, `HH:MM`
    pub published_at: String,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        *self == Listing::default()
    }

    /// First image of the `;`-separated list
    pub fn primary_image(&self) -> &str {
        self.image.split(';').next().unwrap_or("").trim()
    }

    pub fn detail_url(&self) -> String {
        if self.href.starts_with("http://") || self.href.starts_with("https://") {
            self.href.clone()
        } else {
            format!("{}{}", OLX_BASE_URL, self.href)
        }
    }
}

//! Decides whether a listing is newer than the last one reported.
//!
//! OLX shows only a time of day, in a zone three hours behind the clock the
//! comparison runs on. Comparison is by time of day alone; a session that
//! runs across midnight keeps the previous day's baseline.

use crate::models::Listing;
use chrono::{Duration, NaiveTime};

/// Hours added to source timestamps before comparing
pub const SOURCE_OFFSET_HOURS: i64 = 3;

const TIME_FORMAT: &str = "%H:%M";

/// Parse `HH:MM`, falling back to midnight when the text is not a time
pub fn parse_published(text: &str) -> NaiveTime {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).unwrap_or(NaiveTime::MIN)
}

/// Returns true if the listing was published strictly after `last_accepted`.
///
/// Rewrites `listing.published_at` to the offset-adjusted time, which is the
/// value the caller adopts as its next baseline on acceptance.
pub fn is_fresh(listing: &mut Listing, last_accepted: NaiveTime) -> bool {
    let (adjusted, _) = parse_published(&listing.published_at)
        .overflowing_add_signed(Duration::hours(SOURCE_OFFSET_HOURS));
    listing.published_at = adjusted.format(TIME_FORMAT).to_string();
    adjusted > last_accepted
}

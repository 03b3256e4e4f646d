pub mod browser;
pub mod olx;
pub mod traits;

pub use browser::{ChromePhoneLookup, DisabledPhoneLookup};
pub use olx::{OlxExtractor, OlxFetcher};
pub use traits::{DocumentFetcher, PhoneLookup};

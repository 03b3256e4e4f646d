use crate::error::FetchError;
use crate::models::Listing;
use crate::scrapers::traits::DocumentFetcher;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, error, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Divider OLX renders between promoted and organic listings
const PROMOTED_DIVIDER: &str = "div#div-gpt-liting-after-promoted";

/// Inline style that leaks into the price text of negotiable listings
const PRICE_CSS_LEAK: &str = ".css-1vxklie{color:#7F9799;font-size:12px;line-height:16px;font-weight:100;display:block;width:100%;text-align:right;}Договірна";

pub const NEGOTIABLE_LABEL: &str = "Договірна";

/// Plain HTTP fetcher for OLX search pages
pub struct OlxFetcher {
    client: Client,
}

impl OlxFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for OlxFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        debug!(url, "Fetching listing page");

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let html = response.text().await?;
        debug!(url, bytes = html.len(), "Downloaded listing page");
        Ok(html)
    }
}

/// Reads the newest organic listing out of an OLX search page
pub struct OlxExtractor {
    divider: Selector,
    title: Selector,
    price: Selector,
    link: Selector,
    image: Selector,
    location_date: Selector,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css}: {e:?}"))
}

impl OlxExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            divider: selector(PROMOTED_DIVIDER)?,
            title: selector("h6")?,
            price: selector(r#"p[data-testid="ad-price"]"#)?,
            link: selector("a[href]")?,
            image: selector("img[src]")?,
            location_date: selector(r#"p[data-testid="location-date"]"#)?,
        })
    }

    /// Parse a raw page and extract from it.
    ///
    /// `Html` is not `Send`, so async callers go through this to keep the
    /// parsed tree out of their futures.
    pub fn extract_from_body(&self, body: &str) -> Listing {
        let document = Html::parse_document(body);
        self.extract(Some(&document))
    }

    /// Extract the first listing following the promoted divider.
    ///
    /// Missing nodes leave their field empty. Only a missing document is
    /// reported as an error.
    pub fn extract(&self, document: Option<&Html>) -> Listing {
        let Some(document) = document else {
            error!("document is missing");
            return Listing::default();
        };

        let Some(divider) = document.select(&self.divider).next() else {
            warn!("promoted divider not found, page layout may have changed");
            return Listing::default();
        };

        let Some(card) = divider.next_siblings().find_map(ElementRef::wrap) else {
            warn!("no listing follows the promoted divider");
            return Listing::default();
        };

        let title = self.text_of(card, &self.title, "title");
        let price = clean_price(&self.text_of(card, &self.price, "price"));
        let href = self.attr_of(card, &self.link, "href", "link");
        let image = self.attr_of(card, &self.image, "src", "image");
        let location_date = self.text_of(card, &self.location_date, "location-date");

        let published_at = location_date
            .split_whitespace()
            .last()
            .unwrap_or("")
            .to_string();
        let city = location_date
            .split(" - ")
            .next()
            .unwrap_or("")
            .trim()
            .to_string();

        debug!(%title, %price, %city, %published_at, "Extracted listing");

        Listing {
            title,
            image,
            price,
            city,
            href,
            published_at,
        }
    }

    fn text_of(&self, card: ElementRef<'_>, selector: &Selector, field: &str) -> String {
        match card.select(selector).next() {
            Some(node) => node.text().collect::<String>().trim().to_string(),
            None => {
                warn!(field, "listing field not found");
                String::new()
            }
        }
    }

    fn attr_of(
        &self,
        card: ElementRef<'_>,
        selector: &Selector,
        attr: &str,
        field: &str,
    ) -> String {
        match card.select(selector).next().and_then(|node| node.value().attr(attr)) {
            Some(value) => value.to_string(),
            None => {
                warn!(field, "listing field not found");
                String::new()
            }
        }
    }
}

/// Swap the leaked stylesheet text for the plain negotiable label
pub fn clean_price(raw: &str) -> String {
    raw.replace(PRICE_CSS_LEAK, NEGOTIABLE_LABEL)
}

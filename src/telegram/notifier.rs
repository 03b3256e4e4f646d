use crate::models::{Listing, SubscriberId};
use crate::notify::Notifier;
use crate::telegram::client::TelegramClient;
use crate::telegram::types::InlineKeyboardMarkup;
use anyhow::{Context, Result};
use async_trait::async_trait;

const LINK_BUTTON_TEXT: &str = "Объявление";

/// Sends each accepted listing as a photo message with a link button
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

pub fn format_caption(listing: &Listing, phone: Option<&str>) -> String {
    let mut caption = format!(
        "{}\nЦена: {}\nГород: {}\n",
        listing.title, listing.price, listing.city
    );
    if let Some(phone) = phone.filter(|p| !p.is_empty()) {
        caption.push_str(&format!("Номер телефона: {}\n", phone));
    }
    caption.push_str(&format!("Время публикации: {}", listing.published_at));
    caption
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(
        &self,
        subscriber: SubscriberId,
        listing: &Listing,
        phone: Option<&str>,
    ) -> Result<()> {
        let markup = InlineKeyboardMarkup::link(LINK_BUTTON_TEXT, listing.detail_url());

        self.client
            .send_photo(
                subscriber.0,
                listing.primary_image(),
                &format_caption(listing, phone),
                &markup,
            )
            .await
            .with_context(|| format!("Failed to notify subscriber {}", subscriber))
    }
}

pub mod client;
pub mod notifier;
pub mod types;

pub use client::TelegramClient;
pub use notifier::TelegramNotifier;

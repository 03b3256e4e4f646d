mod archive;
mod bot;
mod config;
mod error;
mod freshness;
mod logging;
mod models;
mod notify;
mod registry;
mod scrapers;
mod session;
mod telegram;
mod validate;

use archive::FsImageArchiver;
use bot::Bot;
use config::Config;
use logging::LogMode;
use registry::SessionRegistry;
use scrapers::{ChromePhoneLookup, DisabledPhoneLookup, OlxExtractor, OlxFetcher, PhoneLookup};
use session::{Jitter, Pipeline};
use std::sync::Arc;
use telegram::{TelegramClient, TelegramNotifier};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init(LogMode::from_env_value(std::env::var("ENV").ok().as_deref()))?;

    info!("🏠 OLX Watch - listing notifier");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let client = TelegramClient::new(&config.telegram_api_url, &config.telegram_token)?;

    let phones: Arc<dyn PhoneLookup> = if config.phone_lookup {
        Arc::new(ChromePhoneLookup::new(config.phone_timeout))
    } else {
        Arc::new(DisabledPhoneLookup)
    };

    let pipeline = Pipeline {
        fetcher: Arc::new(OlxFetcher::new()?),
        extractor: Arc::new(OlxExtractor::new()?),
        notifier: Arc::new(TelegramNotifier::new(client.clone())),
        archiver: Arc::new(FsImageArchiver::new(&config.image_path)?),
        phones,
        jitter: Jitter::new(config.max_jitter),
        phone_timeout: config.phone_timeout,
    };

    info!(
        phone_lookup = pipeline.phones.backend_name(),
        max_jitter_secs = config.max_jitter.as_secs(),
        image_path = %config.image_path.display(),
        "Application started"
    );

    let bot = Bot::new(client, SessionRegistry::new(pipeline));
    bot.run().await;

    Ok(())
}

//! Telegram command surface: turns chat messages into registry calls.

use crate::error::SubmitError;
use crate::models::SubscriberId;
use crate::registry::{SessionRegistry, StopOutcome};
use crate::telegram::types::Message;
use crate::telegram::TelegramClient;
use std::time::Duration;
use tracing::{error, info, warn};

const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

const ADD_URL_PROMPT: &str = "Введите URL-адрес для парсинга.\
\n\nНа OLX выберите нужный город, категорию товаров, фильтры и параметры поиска. \
После того, как все критерии заданы, скопируйте URL-адрес из адресной строки браузера \
и отправьте его боту.\
\n\nПример подходящей ссылки: https://www.olx.ua/uk/nedvizhimost/kvartiry/prodazha-kvartir/";

const URL_ACCEPTED: &str =
    "URL успешно добавлен.\n\nКак только подходящие объявления появятся, бот оповестит вас.";
const URL_REJECTED: &str = "Неверный URL. Пожалуйста, попробуйте еще раз.";
const STOPPED: &str = "Парсер остановлен!";
const NOT_STARTED: &str = "Парсинг еще не начат!";
const HELP: &str = "Доступные команды:\
\n/addurl - добавить ссылку на категорию или поиск OLX для отслеживания новых объявлений. \
Бот будет парсить указанную страницу и оповещать о свежих публикациях\
\n/stopparse - остановить парсинг\
\n/help - помощь";

pub struct Bot {
    client: TelegramClient,
    registry: SessionRegistry,
}

impl Bot {
    pub fn new(client: TelegramClient, registry: SessionRegistry) -> Self {
        Self { client, registry }
    }

    /// Long-poll Telegram forever, answering each text message in order
    pub async fn run(&self) {
        info!("🤖 Bot polling for updates");
        let mut offset = 0;

        loop {
            let updates = match self.client.get_updates(offset, LONG_POLL_TIMEOUT).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!(error = %e, "Failed to poll updates");
                    tokio::time::sleep(POLL_ERROR_PAUSE).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(message) = update.message {
                    self.dispatch(message).await;
                }
            }
        }
    }

    async fn dispatch(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let (subscriber, name) = match &message.from {
            Some(user) => (
                SubscriberId(user.id),
                user.username.clone().unwrap_or_else(|| user.first_name.clone()),
            ),
            None => (SubscriberId(message.chat.id), String::new()),
        };

        let reply = self.handle(subscriber, &name, text).await;
        if let Err(e) = self.client.send_message(message.chat.id, &reply).await {
            warn!(%subscriber, error = %e, "Failed to send reply");
        }
    }

    /// Reply for one incoming text
    pub async fn handle(&self, subscriber: SubscriberId, name: &str, text: &str) -> String {
        let command = text.split_whitespace().next().unwrap_or("");
        // Group chats address commands as /cmd@botname
        let command = command.split('@').next().unwrap_or("");

        match command {
            "/start" => format!(
                "Привет, {}! Я бот для парсинга объявлений на OLX. \
                 Чтобы начать, нажмите команду /addurl",
                name
            ),
            "/addurl" => {
                self.registry.begin_url_entry(subscriber).await;
                ADD_URL_PROMPT.to_string()
            }
            "/stopparse" => match self.registry.request_stop(subscriber).await {
                StopOutcome::Stopped => {
                    let url = self.registry.url_for(subscriber).await.unwrap_or_default();
                    info!(%subscriber, %url, "Parsing stopped by subscriber");
                    STOPPED.to_string()
                }
                StopOutcome::NotRunning => NOT_STARTED.to_string(),
            },
            "/help" => HELP.to_string(),
            _ => match self.registry.submit_url(subscriber, text).await {
                Ok(_) => URL_ACCEPTED.to_string(),
                Err(SubmitError::InvalidUrl(_)) => URL_REJECTED.to_string(),
                Err(SubmitError::NotAwaitingUrl) => text.to_string(),
            },
        }
    }
}

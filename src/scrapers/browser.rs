use crate::scrapers::traits::PhoneLookup;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

const REVEAL_PHONE_BUTTON: &str = r#"button[data-cy="ad-contact-phone"]"#;
const PHONE_LINK: &str = r#"a[data-testid="contact-phone"]"#;

const MAX_RENDER_WAIT: Duration = Duration::from_secs(5);

/// Reveals the seller phone on a detail page using headless Chrome
pub struct ChromePhoneLookup {
    render_wait: Duration,
    /// Bound on each of navigation, button lookup and phone lookup
    step_timeout: Duration,
}

impl ChromePhoneLookup {
    /// All browser waits together stay within `budget`, so an abandoned
    /// lookup does not keep a blocking thread busy past it.
    pub fn new(budget: Duration) -> Self {
        let render_wait = MAX_RENDER_WAIT.min(budget / 4);
        Self {
            render_wait,
            step_timeout: budget.saturating_sub(render_wait) / 3,
        }
    }

    fn total_wait(&self) -> Duration {
        self.render_wait + self.step_timeout * 3
    }

    fn lookup_blocking(url: &str, render_wait: Duration, step_timeout: Duration) -> Result<String> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab()?;
        tab.set_default_timeout(step_timeout);

        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        // Phone button is rendered client-side
        thread::sleep(render_wait);

        tab.wait_for_element_with_custom_timeout(REVEAL_PHONE_BUTTON, step_timeout)
            .context("Phone button not found")?
            .click()?;

        let phone = tab
            .wait_for_element_with_custom_timeout(PHONE_LINK, step_timeout)
            .context("Phone link not revealed")?
            .get_inner_text()?;

        Ok(phone.trim().to_string())
    }
}

#[async_trait]
impl PhoneLookup for ChromePhoneLookup {
    async fn lookup(&self, detail_url: &str) -> Result<String> {
        info!(
            url = detail_url,
            budget = ?self.total_wait(),
            "Revealing phone in headless Chrome"
        );

        let url = detail_url.to_string();
        let (render_wait, step_timeout) = (self.render_wait, self.step_timeout);
        let phone = tokio::task::spawn_blocking(move || {
            Self::lookup_blocking(&url, render_wait, step_timeout)
        })
        .await
        .context("Phone lookup task panicked")??;

        debug!(url = detail_url, %phone, "Phone revealed");
        Ok(phone)
    }

    fn backend_name(&self) -> &'static str {
        "chrome"
    }
}

/// Used when phone lookup is switched off
pub struct DisabledPhoneLookup;

#[async_trait]
impl PhoneLookup for DisabledPhoneLookup {
    async fn lookup(&self, _detail_url: &str) -> Result<String> {
        Ok(String::new())
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}

//! One subscriber's polling loop.
//!
//! Each cycle fetches the subscriber's search page, extracts the newest
//! listing, gates it on freshness and hands accepted listings to the
//! notifier. Cycles are sequential and separated by a random wait, except
//! that a failed fetch is retried straight away. The loop ends only when
//! its cancellation token fires.

use crate::archive::ImageArchiver;
use crate::freshness::{is_fresh, parse_published};
use crate::models::SubscriberId;
use crate::notify::Notifier;
use crate::scrapers::{DocumentFetcher, OlxExtractor, PhoneLookup};
use chrono::NaiveTime;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound for the random wait between cycles, exclusive
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    pub max: Duration,
}

impl Jitter {
    pub fn new(max: Duration) -> Self {
        Self { max }
    }

    /// Uniform in `[0, max)` whole seconds, or zero when `max` is under a second
    pub fn next_delay(&self) -> Duration {
        let max_secs = self.max.as_secs();
        if max_secs == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::rng().random_range(0..max_secs))
    }
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct Pipeline {
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub extractor: Arc<OlxExtractor>,
    pub notifier: Arc<dyn Notifier>,
    pub archiver: Arc<dyn ImageArchiver>,
    pub phones: Arc<dyn PhoneLookup>,
    pub jitter: Jitter,
    pub phone_timeout: Duration,
}

/// How a single poll cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Completed,
    FetchFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopping,
    Stopped,
}

pub struct Session {
    subscriber: SubscriberId,
    url: String,
    last_accepted: NaiveTime,
    cancel: CancellationToken,
    pipeline: Pipeline,
    state: SessionState,
}

impl Session {
    pub fn new(
        subscriber: SubscriberId,
        url: impl Into<String>,
        cancel: CancellationToken,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            subscriber,
            url: url.into(),
            last_accepted: NaiveTime::MIN,
            cancel,
            pipeline,
            state: SessionState::Running,
        }
    }

    /// Poll until cancelled
    pub async fn run(mut self) -> SessionState {
        info!(subscriber = %self.subscriber, url = %self.url, "Session started");

        while self.state == SessionState::Running {
            let cycle = self.poll_once().await;

            if self.cancel.is_cancelled() {
                self.state = SessionState::Stopping;
                break;
            }

            if cycle == Cycle::FetchFailed {
                tokio::task::yield_now().await;
                continue;
            }

            let wait = self.pipeline.jitter.next_delay();
            debug!(
                subscriber = %self.subscriber,
                wait_secs = wait.as_secs(),
                "Waiting before next poll"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => self.state = SessionState::Stopping,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.state = SessionState::Stopped;
        info!(subscriber = %self.subscriber, "Session stopped");
        self.state
    }

    /// One fetch, extract, gate, notify cycle. Failures are logged and the
    /// cycle simply ends.
    async fn poll_once(&mut self) -> Cycle {
        info!(subscriber = %self.subscriber, "Fetching ads");

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return Cycle::Completed,
            fetched = self.pipeline.fetcher.fetch(&self.url) => fetched,
        };

        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                error!(
                    subscriber = %self.subscriber,
                    url = %self.url,
                    error = %e,
                    "Failed to fetch listing page"
                );
                return Cycle::FetchFailed;
            }
        };

        let mut listing = self.pipeline.extractor.extract_from_body(&body);
        if listing.is_empty() {
            warn!(subscriber = %self.subscriber, url = %self.url, "No listing extracted");
            return Cycle::Completed;
        }

        if !is_fresh(&mut listing, self.last_accepted) {
            debug!(
                subscriber = %self.subscriber,
                published_at = %listing.published_at,
                "Listing already reported"
            );
            return Cycle::Completed;
        }

        // Adopted even if delivery fails below
        self.last_accepted = parse_published(&listing.published_at);

        let phone = self.lookup_phone(&listing.detail_url()).await;
        if self.cancel.is_cancelled() {
            return Cycle::Completed;
        }

        match self
            .pipeline
            .notifier
            .deliver(self.subscriber, &listing, phone.as_deref())
            .await
        {
            Ok(()) => info!(
                subscriber = %self.subscriber,
                title = %listing.title,
                price = %listing.price,
                city = %listing.city,
                time = %listing.published_at,
                phone = phone.as_deref().unwrap_or(""),
                href = %listing.href,
                "Sent listing"
            ),
            Err(e) => error!(
                subscriber = %self.subscriber,
                error = %e,
                "Failed to deliver listing"
            ),
        }

        if let Err(e) = self.pipeline.archiver.save(listing.primary_image()).await {
            warn!(subscriber = %self.subscriber, error = %e, "Failed to save listing image");
        }

        Cycle::Completed
    }

    async fn lookup_phone(&self, detail_url: &str) -> Option<String> {
        let lookup = tokio::time::timeout(
            self.pipeline.phone_timeout,
            self.pipeline.phones.lookup(detail_url),
        );

        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = lookup => match result {
                Ok(Ok(phone)) if !phone.is_empty() => Some(phone),
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    warn!(
                        subscriber = %self.subscriber,
                        backend = self.pipeline.phones.backend_name(),
                        error = %e,
                        "Phone lookup failed"
                    );
                    None
                }
                Err(_) => {
                    warn!(
                        subscriber = %self.subscriber,
                        backend = self.pipeline.phones.backend_name(),
                        "Phone lookup timed out"
                    );
                    None
                }
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators for session and registry tests

    use super::*;
    use crate::error::FetchError;
    use crate::models::Listing;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    pub fn page(published: &str, title: &str) -> String {
        format!(
            r#"<div id="div-gpt-liting-after-promoted"></div>
               <div>
                 <a href="/d/{title}.html"><img src="https://img/{title}.jpg"></a>
                 <h6>{title}</h6>
                 <p data-testid="ad-price">100 грн.</p>
                 <p data-testid="location-date">Київ - Сьогодні о {published}</p>
               </div>"#
        )
    }

    /// Serves scripted responses, repeating the last one forever
    pub struct ScriptedFetcher {
        script: Mutex<VecDeque<std::result::Result<String, u16>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub fn new(script: Vec<std::result::Result<String, u16>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            match next {
                Some(Ok(body)) => Ok(body),
                Some(Err(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                }),
                None => Err(FetchError::Network("empty script".to_string())),
            }
        }
    }

    /// Records deliveries on a channel
    pub struct ChannelNotifier {
        tx: mpsc::UnboundedSender<(SubscriberId, Listing, Option<String>)>,
        fail: bool,
    }

    impl ChannelNotifier {
        pub fn new(
            fail: bool,
        ) -> (
            Arc<Self>,
            mpsc::UnboundedReceiver<(SubscriberId, Listing, Option<String>)>,
        ) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { tx, fail }), rx)
        }
    }

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn deliver(
            &self,
            subscriber: SubscriberId,
            listing: &Listing,
            phone: Option<&str>,
        ) -> Result<()> {
            let _ = self
                .tx
                .send((subscriber, listing.clone(), phone.map(String::from)));
            if self.fail {
                return Err(anyhow!("chat unreachable"));
            }
            Ok(())
        }
    }

    pub struct FailingArchiver;

    #[async_trait]
    impl ImageArchiver for FailingArchiver {
        async fn save(&self, _image_url: &str) -> Result<()> {
            Err(anyhow!("disk full"))
        }
    }

    pub struct FixedPhone(pub &'static str);

    #[async_trait]
    impl PhoneLookup for FixedPhone {
        async fn lookup(&self, _detail_url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn backend_name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Never answers; counts how many lookups were started
    #[derive(Default)]
    pub struct HangingPhone {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl PhoneLookup for HangingPhone {
        async fn lookup(&self, _detail_url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(String::new())
        }

        fn backend_name(&self) -> &'static str {
            "hanging"
        }
    }

    /// Never answers; counts how many fetches were started
    #[derive(Default)]
    pub struct HangingFetcher {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentFetcher for HangingFetcher {
        async fn fetch(&self, _url: &str) -> std::result::Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Err(FetchError::Network("unreachable".to_string()))
        }
    }

    pub fn pipeline(
        fetcher: Arc<dyn DocumentFetcher>,
        notifier: Arc<dyn Notifier>,
        phones: Arc<dyn PhoneLookup>,
    ) -> Pipeline {
        Pipeline {
            fetcher,
            extractor: Arc::new(OlxExtractor::new().unwrap()),
            notifier,
            archiver: Arc::new(FailingArchiver),
            phones,
            jitter: Jitter::new(Duration::from_secs(60)),
            phone_timeout: Duration::from_secs(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    const URL: &str = "https://www.olx.ua/uk/";

    fn spawn_session(
        subscriber: i64,
        pipeline: Pipeline,
    ) -> (CancellationToken, tokio::task::JoinHandle<SessionState>) {
        let cancel = CancellationToken::new();
        let session = Session::new(SubscriberId(subscriber), URL, cancel.clone(), pipeline);
        (cancel, tokio::spawn(session.run()))
    }

    #[test]
    fn jitter_stays_below_max() {
        let jitter = Jitter::new(Duration::from_secs(3));
        for _ in 0..100 {
            assert!(jitter.next_delay() < Duration::from_secs(3));
        }
        assert_eq!(Jitter::new(Duration::ZERO).next_delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_each_new_listing_once() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page("10:00", "first")),
            Ok(page("10:00", "first")),
            Ok(page("10:05", "second")),
        ]);
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let pipeline = pipeline(
            fetcher.clone(),
            notifier,
            Arc::new(FixedPhone("067 000 00 00")),
        );
        let (cancel, task) = spawn_session(1, pipeline);

        let (subscriber, first, phone) = delivered.recv().await.unwrap();
        assert_eq!(subscriber, SubscriberId(1));
        assert_eq!(first.title, "first");
        assert_eq!(first.published_at, "13:00");
        assert_eq!(phone.as_deref(), Some("067 000 00 00"));

        let (_, second, _) = delivered.recv().await.unwrap();
        assert_eq!(second.title, "second");
        assert_eq!(second.published_at, "13:05");
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 3);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert!(delivered.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_do_not_end_session() {
        let fetcher = ScriptedFetcher::new(vec![Err(503), Err(503), Ok(page("09:00", "late"))]);
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let pipeline = pipeline(fetcher.clone(), notifier, Arc::new(FixedPhone("")));
        let (cancel, task) = spawn_session(2, pipeline);

        let (_, listing, phone) = delivered.recv().await.unwrap();
        assert_eq!(listing.title, "late");
        assert_eq!(phone, None);
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 3);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_retried_without_waiting() {
        let fetcher = ScriptedFetcher::new(vec![Err(503), Err(503), Ok(page("09:00", "late"))]);
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let mut pipeline = pipeline(fetcher.clone(), notifier, Arc::new(FixedPhone("")));
        pipeline.jitter = Jitter::new(Duration::from_secs(3600));

        let started = tokio::time::Instant::now();
        let (cancel, task) = spawn_session(3, pipeline);

        delivered.recv().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 3);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_failure_still_advances_baseline() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page("10:00", "only"))]);
        let (notifier, mut delivered) = ChannelNotifier::new(true);
        let pipeline = pipeline(fetcher.clone(), notifier, Arc::new(FixedPhone("")));
        let (cancel, task) = spawn_session(4, pipeline);

        delivered.recv().await.unwrap();

        // Let several more cycles run against the same page
        while fetcher.calls.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        assert!(delivered.try_recv().is_err());

        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_is_not_reported() {
        let fetcher = ScriptedFetcher::new(vec![Ok("<html><body></body></html>".to_string())]);
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let pipeline = pipeline(fetcher.clone(), notifier, Arc::new(FixedPhone("")));
        let (cancel, task) = spawn_session(5, pipeline);

        while fetcher.calls.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        assert!(delivered.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_phone_lookup_times_out() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page("11:00", "slow"))]);
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let pipeline = pipeline(fetcher, notifier, Arc::new(HangingPhone::default()));
        let (cancel, task) = spawn_session(6, pipeline);

        let (_, listing, phone) = delivered.recv().await.unwrap();
        assert_eq!(listing.title, "slow");
        assert_eq!(phone, None);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_preempts_the_wait() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page("10:00", "x"))]);
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let mut pipeline = pipeline(fetcher.clone(), notifier, Arc::new(FixedPhone("")));
        pipeline.jitter = Jitter::new(Duration::from_secs(3600));
        let (cancel, task) = spawn_session(7, pipeline);

        delivered.recv().await.unwrap();
        let before = tokio::time::Instant::now();
        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_preempts_a_pending_fetch() {
        let fetcher = Arc::new(HangingFetcher::default());
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let pipeline = pipeline(fetcher.clone(), notifier, Arc::new(FixedPhone("")));
        let (cancel, task) = spawn_session(8, pipeline);

        while fetcher.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let before = tokio::time::Instant::now();
        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(delivered.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_preempts_a_pending_phone_lookup() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page("10:00", "x"))]);
        let phones = Arc::new(HangingPhone::default());
        let (notifier, mut delivered) = ChannelNotifier::new(false);
        let mut pipeline = pipeline(fetcher, notifier, phones.clone());
        pipeline.phone_timeout = Duration::from_secs(3600);
        let (cancel, task) = spawn_session(9, pipeline);

        while phones.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let before = tokio::time::Instant::now();
        cancel.cancel();
        assert_eq!(task.await.unwrap(), SessionState::Stopped);
        assert!(before.elapsed() < Duration::from_secs(1));
        assert!(delivered.try_recv().is_err());
    }
}

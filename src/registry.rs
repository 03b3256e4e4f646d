use crate::error::SubmitError;
use crate::models::SubscriberId;
use crate::session::{Pipeline, Session};
use crate::validate::is_valid_url;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifies one started session, so a late exit cannot evict a newer one
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct RegistryState {
    awaiting_url: HashSet<SubscriberId>,
    urls: HashMap<SubscriberId, String>,
    sessions: HashMap<SubscriberId, SessionHandle>,
}

/// Tracks which subscribers have a polling session and how to stop it.
///
/// Holds only cancellation tokens, never task handles; a session removes
/// its own entry when it exits.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
    next_id: Arc<AtomicU64>,
    pipeline: Pipeline,
}

impl SessionRegistry {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            pipeline,
        }
    }

    /// Mark the subscriber as about to send a URL
    pub async fn begin_url_entry(&self, subscriber: SubscriberId) {
        self.state.lock().await.awaiting_url.insert(subscriber);
        debug!(%subscriber, "Awaiting URL");
    }

    /// Start polling `url` for a subscriber that asked to enter one.
    ///
    /// A session already running for the subscriber is stopped first.
    pub async fn submit_url(
        &self,
        subscriber: SubscriberId,
        url: &str,
    ) -> Result<SessionId, SubmitError> {
        let url = url.trim();
        let mut state = self.state.lock().await;

        if !state.awaiting_url.contains(&subscriber) {
            return Err(SubmitError::NotAwaitingUrl);
        }
        if !is_valid_url(url) {
            warn!(%subscriber, url, "Rejected URL");
            return Err(SubmitError::InvalidUrl(url.to_string()));
        }

        if let Some(previous) = state.sessions.remove(&subscriber) {
            info!(%subscriber, session = previous.id, "Replacing running session");
            previous.cancel.cancel();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        state.urls.insert(subscriber, url.to_string());
        state.sessions.insert(
            subscriber,
            SessionHandle {
                id,
                cancel: cancel.clone(),
            },
        );
        state.awaiting_url.remove(&subscriber);
        drop(state);

        let session = Session::new(subscriber, url, cancel, self.pipeline.clone());
        let registry = self.clone();
        tokio::spawn(async move {
            session.run().await;
            registry.on_session_exit(subscriber, id).await;
        });

        info!(%subscriber, session = id, url, "Session accepted");
        Ok(id)
    }

    /// Signal the subscriber's session to stop. Never blocks on the session.
    pub async fn request_stop(&self, subscriber: SubscriberId) -> StopOutcome {
        let state = self.state.lock().await;
        match state.sessions.get(&subscriber) {
            Some(handle) if !handle.cancel.is_cancelled() => {
                handle.cancel.cancel();
                info!(%subscriber, session = handle.id, "Stop requested");
                StopOutcome::Stopped
            }
            _ => StopOutcome::NotRunning,
        }
    }

    /// Drop the bookkeeping of an exited session. Idempotent.
    pub async fn on_session_exit(&self, subscriber: SubscriberId, session: SessionId) {
        let mut state = self.state.lock().await;
        if state.sessions.get(&subscriber).is_some_and(|h| h.id == session) {
            state.sessions.remove(&subscriber);
            debug!(%subscriber, session, "Session entry removed");
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self, subscriber: SubscriberId) -> bool {
        self.state
            .lock()
            .await
            .sessions
            .get(&subscriber)
            .is_some_and(|h| !h.cancel.is_cancelled())
    }

    #[cfg(test)]
    pub async fn has_session_entry(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().await.sessions.contains_key(&subscriber)
    }

    #[cfg(test)]
    pub async fn is_awaiting_url(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().await.awaiting_url.contains(&subscriber)
    }

    pub async fn url_for(&self, subscriber: SubscriberId) -> Option<String> {
        self.state.lock().await.urls.get(&subscriber).cloned()
    }
}

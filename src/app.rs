//! # App Bootstrap
//!
//! Wires the backend, the store, the notifier and the router together, checks
//! the session, and runs the periodic refresh.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::{Backend, BackendError, RestBackend};
use crate::core::config::ResolvedConfig;
use crate::core::notify::{Notifier, Severity};
use crate::core::router::{DispatchError, Outcome, Router};
use crate::core::store::{Field, Store};
use crate::modules::refresh::REFRESH_TAG;
use crate::modules::{AppContext, build_router};

pub const SIGNED_OUT_MESSAGE: &str = "You are not signed in. Set SHIFTLOG_EMAIL and SHIFTLOG_PASSWORD, or an access token.";

#[derive(Clone)]
pub struct App {
    pub ctx: Arc<AppContext>,
    pub router: Arc<Router>,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(Store::new());
        let ctx = Arc::new(AppContext::new(backend, store, notifier));
        let router = Arc::new(build_router(&ctx));
        Self { ctx, router }
    }

    /// Checks the session and, when signed in, loads everything once.
    ///
    /// Returns whether a user is signed in.
    pub async fn bootstrap(&self) -> bool {
        let user = match self.ctx.backend.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Session check failed: {}", e);
                self.ctx.notify(e.message(), Severity::Error);
                return false;
            }
        };
        let Some(user) = user else {
            info!("No session");
            self.ctx.notify(SIGNED_OUT_MESSAGE, Severity::Error);
            return false;
        };

        info!("Session for user {}", user.id);
        self.ctx.store.set(Field::User(Some(user)));
        match self.router.dispatch_tag(REFRESH_TAG, None).await {
            Ok(outcome) => debug!("Initial refresh: {:?}", outcome),
            Err(e) => warn!("Initial refresh not run: {}", e),
        }
        true
    }

    /// Dispatches `app:refresh` every `interval`, forever. A tick that finds
    /// an action in flight, or no signed-in user, is dropped.
    pub async fn periodic_refresh(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; bootstrap already refreshed
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.refresh_tick().await;
        }
    }

    pub fn spawn_periodic_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let app = self.clone();
        tokio::spawn(async move { app.periodic_refresh(interval).await })
    }

    async fn refresh_tick(&self) -> Option<Outcome> {
        if self.ctx.store.read(|s| s.user.is_none()) {
            debug!("Periodic refresh skipped, no session");
            return None;
        }
        dispatch_refresh(&self.router).await
    }
}

async fn dispatch_refresh(router: &Router) -> Option<Outcome> {
    match router.dispatch_tag(REFRESH_TAG, None).await {
        Ok(outcome) => Some(outcome),
        Err(DispatchError::Busy(_)) => {
            debug!("Periodic refresh skipped, action in flight");
            None
        }
        Err(e) => {
            warn!("Periodic refresh not dispatched: {}", e);
            None
        }
    }
}

/// Builds the REST client, signing in with email and password when there is
/// no access token yet.
pub async fn connect(config: &ResolvedConfig) -> Result<Arc<RestBackend>, BackendError> {
    let backend = RestBackend::new(
        config.backend_url.clone(),
        config.anon_key.clone(),
        config.access_token.clone(),
    );
    if config.access_token.is_none()
        && let (Some(email), Some(password)) = (&config.email, &config.password)
    {
        backend.sign_in(email, password).await?;
    }
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tables;
    use crate::test_support::{MemoryBackend, RecordingNotifier, test_context};

    fn app_over(backend: Arc<MemoryBackend>) -> (App, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (App::new(backend, notifier.clone()), notifier)
    }

    #[tokio::test]
    async fn test_bootstrap_loads_session_and_data() {
        let backend = Arc::new(MemoryBackend::default());
        let (app, notifier) = app_over(backend.clone());

        assert!(app.bootstrap().await);

        let state = app.ctx.store.snapshot();
        assert_eq!(state.user.map(|u| u.id).as_deref(), Some("u1"));
        assert!(state.settings.is_some());
        assert_eq!(backend.rows(tables::SETTINGS).len(), 1);
        assert_eq!(notifier.count(), 0);
        assert!(!app.router.is_busy());
    }

    #[tokio::test]
    async fn test_bootstrap_reports_unreachable_backend() {
        let backend = Arc::new(MemoryBackend::default());
        backend.fail_with("connection refused");
        let (app, notifier) = app_over(backend);

        assert!(!app.bootstrap().await);

        assert_eq!(
            notifier.messages(),
            vec![("connection refused".to_string(), Severity::Error)]
        );
        assert!(app.ctx.store.read(|s| s.user.is_none()));
    }

    #[tokio::test]
    async fn test_refresh_tick_dropped_while_busy() {
        let (ctx, _, notifier) = test_context();
        let router = build_router(&ctx);
        let held = router.prepare_tag("finance:load", None).unwrap();

        assert_eq!(dispatch_refresh(&router).await, None);
        drop(held);
        assert_eq!(dispatch_refresh(&router).await, Some(Outcome::Completed));
        assert_eq!(notifier.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_fires_on_interval() {
        let backend = Arc::new(MemoryBackend::default());
        let (app, _) = app_over(backend.clone());
        app.ctx.store.set(Field::User(Some(crate::core::model::User {
            id: "u1".to_string(),
            email: None,
        })));

        let handle = app.spawn_periodic_refresh(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.abort();

        // The refresh created the settings row
        assert_eq!(backend.rows(tables::SETTINGS).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_idle_without_session() {
        let backend = Arc::new(MemoryBackend::default());
        let (app, notifier) = app_over(backend.clone());

        let handle = app.spawn_periodic_refresh(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(95)).await;
        handle.abort();

        assert_eq!(notifier.count(), 0);
        assert!(backend.rows(tables::SETTINGS).is_empty());
    }
}

//! # Router
//!
//! The one entry point from the UI into business logic. A click on any
//! element is resolved to the nearest tagged ancestor, its
//! `"namespace:method"` tag is looked up in the registry, and the matching
//! handler runs.
//!
//! ```text
//! click ─► closest tagged element ─► parse tag ─► busy? ─► resolve ─► payload
//!                                                  │drop      │drop
//!                                                  ▼          ▼
//!                                               (log)      (log)
//!          ┌───────────────────────────────────────────────────┘
//!          ▼
//!   acquire busy ─► handler(payload, element).await ─► release busy
//!                              │ Err / panic
//!                              ▼
//!                        notify(error)
//! ```
//!
//! ## One at a time
//!
//! A single busy flag covers every namespace. While a handler is in flight,
//! any other click is dropped, not queued. The flag is released by a guard,
//! so it clears on success, on error, on panic, and if the task running
//! the handler is aborted.
//!
//! ## Two phases
//!
//! [`Router::prepare`] is synchronous: it resolves the click and takes the
//! busy flag. [`Router::run`] awaits the handler. The frame loop calls
//! `prepare` inline (so a double click is rejected immediately) and spawns
//! `run`.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};

use crate::backend::BackendError;
use crate::core::action::{ActionTag, ClickEvent, Element, ElementTree, ParseTagError, Payload};
use crate::core::notify::{Notifier, Severity};

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

// ============================================================================
// Errors
// ============================================================================

/// Why a handler failed. Converted into a notification at the router.
#[derive(Debug)]
pub enum HandlerError {
    /// Bad input. The message is shown as-is.
    Validation(String),
    /// The backend refused or could not be reached. Its message is shown as-is.
    Backend(BackendError),
    /// Anything else. The user sees a generic failure.
    Unexpected(String),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        HandlerError::Validation(message.into())
    }

    pub fn user_message(&self) -> String {
        match self {
            HandlerError::Validation(msg) => msg.clone(),
            HandlerError::Backend(e) => e.message().to_string(),
            HandlerError::Unexpected(_) => GENERIC_FAILURE.to_string(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Validation(msg) => write!(f, "validation failed: {msg}"),
            HandlerError::Backend(e) => write!(f, "backend: {e}"),
            HandlerError::Unexpected(msg) => write!(f, "unexpected: {msg}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<BackendError> for HandlerError {
    fn from(e: BackendError) -> Self {
        HandlerError::Backend(e)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Unexpected(e.to_string())
    }
}

/// Why a click did not reach a handler. Never shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Neither the target nor any ancestor carries an action tag.
    NoAction,
    Malformed(ParseTagError),
    Busy(ActionTag),
    UnknownNamespace(ActionTag),
    UnknownMethod(ActionTag),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoAction => write!(f, "no action on target"),
            DispatchError::Malformed(e) => write!(f, "{e}"),
            DispatchError::Busy(tag) => write!(f, "busy, dropped '{tag}'"),
            DispatchError::UnknownNamespace(tag) => {
                write!(f, "unknown namespace '{}' in '{tag}'", tag.namespace)
            }
            DispatchError::UnknownMethod(tag) => {
                write!(f, "unknown method '{}' in '{tag}'", tag.method)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

// ============================================================================
// Handler Sets
// ============================================================================

/// A namespace's handlers, as the router sees them.
///
/// Domain modules implement the typed `Module` trait instead; a blanket impl
/// erases them into this.
#[async_trait]
pub trait HandlerSet: Send + Sync {
    fn has_method(&self, method: &str) -> bool;

    async fn invoke(
        &self,
        method: &str,
        payload: Payload,
        element: &Element,
    ) -> Result<(), HandlerError>;
}

// ============================================================================
// Busy State
// ============================================================================

#[derive(Default)]
struct BusyState {
    busy: AtomicBool,
    in_flight: Mutex<Option<ActionTag>>,
}

/// Holds the busy flag. Dropping it clears the flag and the indicator.
struct BusyGuard {
    state: Arc<BusyState>,
}

impl BusyGuard {
    fn try_acquire(state: &Arc<BusyState>, tag: &ActionTag) -> Option<Self> {
        state
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        *state.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(tag.clone());
        Some(Self {
            state: state.clone(),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self
            .state
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.state.busy.store(false, Ordering::Release);
    }
}

/// A resolved click that owns the busy flag. Run it with [`Router::run`].
pub struct Prepared {
    tag: ActionTag,
    handlers: Arc<dyn HandlerSet>,
    payload: Payload,
    element: Element,
    _guard: BusyGuard,
}

impl Prepared {
    pub fn tag(&self) -> &ActionTag {
        &self.tag
    }
}

// ============================================================================
// Router
// ============================================================================

pub struct Router {
    registry: HashMap<String, Arc<dyn HandlerSet>>,
    busy: Arc<BusyState>,
    notifier: Arc<dyn Notifier>,
}

impl Router {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            registry: HashMap::new(),
            busy: Arc::new(BusyState::default()),
            notifier,
        }
    }

    /// Registers a handler set. A later registration for the same namespace
    /// replaces the earlier one entirely.
    pub fn register(&mut self, namespace: &str, handlers: impl HandlerSet + 'static) {
        if self
            .registry
            .insert(namespace.to_string(), Arc::new(handlers))
            .is_some()
        {
            warn!("Namespace '{}' registered twice, replacing", namespace);
        } else {
            debug!("Registered namespace '{}'", namespace);
        }
    }

    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_busy(&self) -> bool {
        self.busy.busy.load(Ordering::Acquire)
    }

    /// The tag of the action currently running, for drawing a busy indicator.
    pub fn in_flight(&self) -> Option<ActionTag> {
        self.busy
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves a click and takes the busy flag.
    pub fn prepare(
        &self,
        tree: &ElementTree,
        event: &mut ClickEvent,
    ) -> Result<Prepared, DispatchError> {
        let Some((_, element)) = tree.closest_action(event.target) else {
            return Err(DispatchError::NoAction);
        };
        event.prevent_default();
        self.prepare_element(element.clone())
    }

    /// Same as [`Router::prepare`] for a tag that did not come from a click.
    pub fn prepare_tag(&self, tag: &str, payload: Option<&str>) -> Result<Prepared, DispatchError> {
        let mut element = Element::new("").action(tag);
        element.payload = payload.map(str::to_string);
        self.prepare_element(element)
    }

    fn prepare_element(&self, element: Element) -> Result<Prepared, DispatchError> {
        let raw = element.action.as_deref().unwrap_or_default();
        let tag: ActionTag = match raw.parse() {
            Ok(tag) => tag,
            Err(e) => {
                warn!("Dropping click: {}", e);
                return Err(DispatchError::Malformed(e));
            }
        };

        if self.is_busy() {
            info!("Busy, dropping '{}'", tag);
            return Err(DispatchError::Busy(tag));
        }

        let Some(handlers) = self.registry.get(&tag.namespace) else {
            error!("No handlers registered for namespace '{}'", tag.namespace);
            return Err(DispatchError::UnknownNamespace(tag));
        };
        if !handlers.has_method(&tag.method) {
            error!("Namespace '{}' has no method '{}'", tag.namespace, tag.method);
            return Err(DispatchError::UnknownMethod(tag));
        }

        let payload = Payload::parse(element.payload.as_deref());

        let Some(guard) = BusyGuard::try_acquire(&self.busy, &tag) else {
            info!("Busy, dropping '{}'", tag);
            return Err(DispatchError::Busy(tag));
        };

        Ok(Prepared {
            tag,
            handlers: handlers.clone(),
            payload,
            element,
            _guard: guard,
        })
    }

    /// Runs a prepared action to completion, then releases the busy flag.
    pub async fn run(&self, prepared: Prepared) -> Outcome {
        let Prepared {
            tag,
            handlers,
            payload,
            element,
            _guard,
        } = prepared;

        debug!("Running '{}' with payload {:?}", tag, payload);
        let result = AssertUnwindSafe(handlers.invoke(&tag.method, payload, &element))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(())) => {
                debug!("'{}' completed", tag);
                Outcome::Completed
            }
            Ok(Err(e)) => {
                error!("'{}' failed: {}", tag, e);
                self.notifier.notify(&e.user_message(), Severity::Error);
                Outcome::Failed
            }
            Err(_) => {
                error!("'{}' panicked", tag);
                self.notifier.notify(GENERIC_FAILURE, Severity::Error);
                Outcome::Failed
            }
        };
        drop(_guard);
        outcome
    }

    pub async fn handle_click(
        &self,
        tree: &ElementTree,
        event: &mut ClickEvent,
    ) -> Result<Outcome, DispatchError> {
        let prepared = self.prepare(tree, event)?;
        Ok(self.run(prepared).await)
    }

    pub async fn dispatch_tag(
        &self,
        tag: &str,
        payload: Option<&str>,
    ) -> Result<Outcome, DispatchError> {
        let prepared = self.prepare_tag(tag, payload)?;
        Ok(self.run(prepared).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingNotifier;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Counts invocations per method; `gate` holds `slow` until released.
    #[derive(Default)]
    struct Spy {
        calls: Mutex<Vec<(String, Payload, String)>>,
        gate: Arc<Notify>,
        entered: Arc<Notify>,
    }

    struct SpySet(Arc<Spy>);

    #[async_trait]
    impl HandlerSet for SpySet {
        fn has_method(&self, method: &str) -> bool {
            matches!(method, "ok" | "slow" | "invalid" | "boom" | "panic")
        }

        async fn invoke(
            &self,
            method: &str,
            payload: Payload,
            element: &Element,
        ) -> Result<(), HandlerError> {
            self.0.calls.lock().unwrap().push((
                method.to_string(),
                payload,
                element.label.clone(),
            ));
            match method {
                "slow" => {
                    self.0.entered.notify_one();
                    self.0.gate.notified().await;
                    Ok(())
                }
                "invalid" => Err(HandlerError::validation("Amount is required")),
                "boom" => Err(HandlerError::Backend(BackendError::Network(
                    "connection refused".into(),
                ))),
                "panic" => panic!("handler bug"),
                _ => Ok(()),
            }
        }
    }

    fn router_with_spy() -> (Router, Arc<Spy>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut router = Router::new(notifier.clone());
        let spy = Arc::new(Spy::default());
        router.register("spy", SpySet(spy.clone()));
        (router, spy, notifier)
    }

    #[tokio::test]
    async fn test_click_on_nested_label_invokes_handler_once() {
        let (router, spy, notifier) = router_with_spy();
        let mut tree = ElementTree::new();
        let button = tree.push(
            None,
            Element::new("button").action("spy:ok").payload(r#"{"n":1}"#),
        );
        let label = tree.push(Some(button), Element::new("label"));

        let mut event = ClickEvent::new(label);
        let outcome = router.handle_click(&tree, &mut event).await;

        assert_eq!(outcome, Ok(Outcome::Completed));
        assert!(event.default_prevented());
        let calls = spy.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "ok");
        assert_eq!(calls[0].1, Payload::Json(serde_json::json!({"n": 1})));
        assert_eq!(calls[0].2, "button");
        assert_eq!(notifier.count(), 0);
        assert!(!router.is_busy());
    }

    #[tokio::test]
    async fn test_click_without_tag_is_ignored() {
        let (router, spy, _) = router_with_spy();
        let mut tree = ElementTree::new();
        let plain = tree.push(None, Element::new("text"));

        let mut event = ClickEvent::new(plain);
        let outcome = router.handle_click(&tree, &mut event).await;

        assert_eq!(outcome, Err(DispatchError::NoAction));
        assert!(!event.default_prevented());
        assert!(spy.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_tags_are_silent() {
        let (router, spy, notifier) = router_with_spy();

        assert!(matches!(
            router.dispatch_tag("garage", None).await,
            Err(DispatchError::Malformed(_))
        ));
        assert!(matches!(
            router.dispatch_tag("garage:add", None).await,
            Err(DispatchError::UnknownNamespace(_))
        ));
        assert!(matches!(
            router.dispatch_tag("spy:nope", None).await,
            Err(DispatchError::UnknownMethod(_))
        ));

        assert_eq!(notifier.count(), 0);
        assert!(spy.calls.lock().unwrap().is_empty());
        assert!(!router.is_busy());
    }

    #[tokio::test]
    async fn test_second_action_dropped_while_busy() {
        let (router, spy, _) = router_with_spy();
        let router = Arc::new(router);

        let first = router.prepare_tag("spy:slow", None).unwrap();
        let running = {
            let router = router.clone();
            tokio::spawn(async move { router.run(first).await })
        };
        spy.entered.notified().await;

        assert!(router.is_busy());
        assert_eq!(router.in_flight(), Some(ActionTag::new("spy", "slow")));
        assert!(matches!(
            router.dispatch_tag("spy:ok", None).await,
            Err(DispatchError::Busy(_))
        ));

        spy.gate.notify_one();
        assert_eq!(running.await.unwrap(), Outcome::Completed);

        assert!(!router.is_busy());
        assert_eq!(router.in_flight(), None);
        let methods: Vec<String> = spy
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.0.clone())
            .collect();
        assert_eq!(methods, vec!["slow"]);
    }

    #[tokio::test]
    async fn test_validation_error_surfaces_message() {
        let (router, _, notifier) = router_with_spy();

        let outcome = router.dispatch_tag("spy:invalid", None).await;

        assert_eq!(outcome, Ok(Outcome::Failed));
        assert_eq!(
            notifier.messages(),
            vec![("Amount is required".to_string(), Severity::Error)]
        );
        assert!(!router.is_busy());
    }

    #[tokio::test]
    async fn test_backend_error_surfaces_verbatim() {
        let (router, _, notifier) = router_with_spy();

        router.dispatch_tag("spy:boom", None).await.unwrap();

        assert_eq!(
            notifier.messages(),
            vec![("connection refused".to_string(), Severity::Error)]
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_releases_busy_flag() {
        let (router, _, notifier) = router_with_spy();

        let outcome = router.dispatch_tag("spy:panic", None).await;

        assert_eq!(outcome, Ok(Outcome::Failed));
        assert_eq!(
            notifier.messages(),
            vec![(GENERIC_FAILURE.to_string(), Severity::Error)]
        );
        assert!(!router.is_busy());
        assert_eq!(router.dispatch_tag("spy:ok", None).await, Ok(Outcome::Completed));
    }

    #[tokio::test]
    async fn test_dropping_prepared_releases_busy_flag() {
        let (router, _, _) = router_with_spy();
        let prepared = router.prepare_tag("spy:ok", None).unwrap();
        assert!(router.is_busy());
        drop(prepared);
        assert!(!router.is_busy());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        struct Counter(Arc<AtomicUsize>);

        #[async_trait]
        impl HandlerSet for Counter {
            fn has_method(&self, method: &str) -> bool {
                method == "hit"
            }
            async fn invoke(&self, _: &str, _: Payload, _: &Element) -> Result<(), HandlerError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let (mut router, _, _) = router_with_spy();
        let hits = Arc::new(AtomicUsize::new(0));
        router.register("spy", Counter(hits.clone()));

        // The old set's methods are gone: no merge.
        assert!(matches!(
            router.dispatch_tag("spy:ok", None).await,
            Err(DispatchError::UnknownMethod(_))
        ));
        router.dispatch_tag("spy:hit", None).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(router.namespaces(), vec!["spy"]);
    }
}

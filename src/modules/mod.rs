//! # Domain Modules
//!
//! Business logic, one module per namespace. Each module declares a closed
//! command enum, parses method names into it, and handles the commands
//! against the shared [`AppContext`].
//!
//! | namespace  | commands                              |
//! |------------|---------------------------------------|
//! | `app`      | `refresh`                             |
//! | `shifts`   | `start`, `pause`, `resume`, `end`, `load` |
//! | `finance`  | `direction`, `submit`, `delete`, `load` |
//! | `garage`   | `add`, `update`, `delete`, `load`     |
//! | `costs`    | `add`, `delete`, `recalculate`        |
//! | `settings` | `load`, `update`                      |
//!
//! The blanket `HandlerSet` impl below erases a typed module so the router
//! can hold all of them in one table.

pub mod costs;
pub mod finance;
pub mod garage;
pub mod refresh;
pub mod settings;
pub mod shifts;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::Backend;
use crate::core::action::{Element, Payload};
use crate::core::notify::{Notifier, Severity};
use crate::core::router::{HandlerError, HandlerSet, Router};
use crate::core::store::Store;

/// Everything a handler needs: the backend, the store, and the notifier.
pub struct AppContext {
    pub backend: Arc<dyn Backend>,
    pub store: Arc<Store>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppContext {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            store,
            notifier,
        }
    }

    pub fn user_id(&self) -> Result<String, HandlerError> {
        self.store
            .read(|s| s.user.as_ref().map(|u| u.id.clone()))
            .ok_or_else(|| HandlerError::validation("Please sign in first"))
    }

    pub fn notify(&self, message: &str, severity: Severity) {
        self.notifier.notify(message, severity);
    }
}

#[async_trait]
pub trait Module: Send + Sync + 'static {
    const NAMESPACE: &'static str;

    type Command: Copy + Debug + Send + Sync;

    fn parse(method: &str) -> Option<Self::Command>;

    async fn handle(
        &self,
        command: Self::Command,
        payload: Payload,
        element: &Element,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<M: Module> HandlerSet for M {
    fn has_method(&self, method: &str) -> bool {
        M::parse(method).is_some()
    }

    async fn invoke(
        &self,
        method: &str,
        payload: Payload,
        element: &Element,
    ) -> Result<(), HandlerError> {
        let command = M::parse(method).ok_or_else(|| {
            HandlerError::Unexpected(format!("{}:{} is not a command", M::NAMESPACE, method))
        })?;
        self.handle(command, payload, element).await
    }
}

/// Builds the router with every module registered under its namespace.
pub fn build_router(ctx: &Arc<AppContext>) -> Router {
    let mut router = Router::new(ctx.notifier.clone());
    router.register(refresh::AppModule::NAMESPACE, refresh::AppModule::new(ctx.clone()));
    router.register(shifts::Shifts::NAMESPACE, shifts::Shifts::new(ctx.clone()));
    router.register(finance::Finance::NAMESPACE, finance::Finance::new(ctx.clone()));
    router.register(garage::Garage::NAMESPACE, garage::Garage::new(ctx.clone()));
    router.register(costs::Costs::NAMESPACE, costs::Costs::new(ctx.clone()));
    router.register(settings::SettingsModule::NAMESPACE, settings::SettingsModule::new(ctx.clone()));
    router
}

/// Reads a required `id` from `{"id": ...}` or a bare string payload.
pub(crate) fn payload_id(payload: &Payload) -> Result<String, HandlerError> {
    payload
        .str_field("id")
        .or_else(|| payload.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| HandlerError::validation("Missing record id"))
}

//! # App
//!
//! `app:refresh` reloads everything the dashboard shows. It is dispatched
//! once after sign-in and then periodically, through the router like any
//! click, so it never overlaps a user action.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::core::action::{Element, Payload};
use crate::core::router::HandlerError;
use crate::modules::{AppContext, Module, costs, garage, settings, shifts};

pub const REFRESH_TAG: &str = "app:refresh";

/// Settings first (week start feeds the cost math), then fleet and shift,
/// then the derived numbers.
pub async fn refresh_all(ctx: &AppContext) -> Result<(), HandlerError> {
    settings::load_or_create(ctx).await?;
    garage::reload_fleet(ctx).await?;
    shifts::load_active(ctx).await?;
    costs::recalculate(ctx).await?;
    debug!("Refresh complete");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    Refresh,
}

pub struct AppModule {
    ctx: Arc<AppContext>,
}

impl AppModule {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Module for AppModule {
    const NAMESPACE: &'static str = "app";
    type Command = AppCommand;

    fn parse(method: &str) -> Option<AppCommand> {
        match method {
            "refresh" => Some(AppCommand::Refresh),
            _ => None,
        }
    }

    async fn handle(
        &self,
        command: AppCommand,
        _payload: Payload,
        _element: &Element,
    ) -> Result<(), HandlerError> {
        match command {
            AppCommand::Refresh => refresh_all(&self.ctx).await,
        }
    }
}

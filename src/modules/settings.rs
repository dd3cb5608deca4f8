//! # Settings
//!
//! One settings row per user, created with defaults the first time it is
//! loaded. Updates are partial: only the given keys change and unknown keys
//! are ignored.

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::{Map, Value};

use crate::backend::{Query, fetch_one, insert_row, tables};
use crate::core::action::{Element, Payload, parse_number};
use crate::core::model::Settings;
use crate::core::notify::Severity;
use crate::core::router::HandlerError;
use crate::core::store::{Field, LoadingGuard};
use crate::modules::costs::recalculate;
use crate::modules::{AppContext, Module};

pub const MAX_SHIFT_TARGET_HOURS: f64 = 24.0;

/// Loads the user's settings, inserting the defaults if there are none.
pub async fn load_or_create(ctx: &AppContext) -> Result<Settings, HandlerError> {
    let user_id = ctx.user_id()?;
    let existing: Option<Settings> = fetch_one(
        ctx.backend.as_ref(),
        tables::SETTINGS,
        Query::new().eq("user_id", &user_id),
    )
    .await?;

    let settings = match existing {
        Some(settings) => settings,
        None => {
            info!("Creating default settings for {}", user_id);
            insert_row(
                ctx.backend.as_ref(),
                tables::SETTINGS,
                &Settings::defaults_for(user_id),
            )
            .await?
        }
    };
    ctx.store.set(Field::Settings(Some(settings.clone())));
    Ok(settings)
}

fn text(value: &Value, key: &str) -> Result<String, HandlerError> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HandlerError::validation(format!("{key} cannot be empty")))
}

fn number(value: &Value, key: &str) -> Result<f64, HandlerError> {
    parse_number(value).ok_or_else(|| HandlerError::validation(format!("{key} must be a number")))
}

/// Applies `patch` on top of `current`.
pub fn merge(current: &Settings, patch: &Map<String, Value>) -> Result<Settings, HandlerError> {
    let mut next = current.clone();
    for (key, value) in patch {
        match key.as_str() {
            "timezone" => next.timezone = text(value, "Timezone")?,
            "currency" => next.currency = text(value, "Currency")?.to_ascii_uppercase(),
            "week_start_day" => {
                let day = number(value, "Week start day")?;
                if day.fract() != 0.0 || !(1.0..=7.0).contains(&day) {
                    return Err(HandlerError::validation(
                        "Week start day must be between 1 (Monday) and 7 (Sunday)",
                    ));
                }
                next.week_start_day = day as u8;
            }
            "shift_target_hours" => {
                let hours = number(value, "Shift target")?;
                if hours <= 0.0 || hours > MAX_SHIFT_TARGET_HOURS {
                    return Err(HandlerError::validation(
                        "Shift target must be between 0 and 24 hours",
                    ));
                }
                next.shift_target_hours = hours;
            }
            "daily_income_goal" => {
                let goal = number(value, "Daily income goal")?;
                if goal < 0.0 {
                    return Err(HandlerError::validation(
                        "Daily income goal cannot be negative",
                    ));
                }
                next.daily_income_goal = goal;
            }
            _ => {}
        }
    }
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsCommand {
    Load,
    Update,
}

pub struct SettingsModule {
    ctx: Arc<AppContext>,
}

impl SettingsModule {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    async fn update(&self, payload: &Payload) -> Result<(), HandlerError> {
        let patch = payload
            .as_object()
            .ok_or_else(|| HandlerError::validation("Nothing to update"))?;
        let current = match self.ctx.store.read(|s| s.settings.clone()) {
            Some(settings) => settings,
            None => load_or_create(&self.ctx).await?,
        };
        let next = merge(&current, patch)?;
        if next == current {
            return Ok(());
        }

        let _loading = LoadingGuard::new(&self.ctx.store);
        self.ctx
            .backend
            .update(
                tables::SETTINGS,
                &Query::new().eq("user_id", &next.user_id),
                serde_json::to_value(&next)?,
            )
            .await?;
        self.ctx.store.set(Field::Settings(Some(next)));
        // Week start affects rental progress
        recalculate(&self.ctx).await?;
        self.ctx.notify("Settings saved", Severity::Success);
        Ok(())
    }
}

#[async_trait]
impl Module for SettingsModule {
    const NAMESPACE: &'static str = "settings";
    type Command = SettingsCommand;

    fn parse(method: &str) -> Option<SettingsCommand> {
        match method {
            "load" => Some(SettingsCommand::Load),
            "update" => Some(SettingsCommand::Update),
            _ => None,
        }
    }

    async fn handle(
        &self,
        command: SettingsCommand,
        payload: Payload,
        _element: &Element,
    ) -> Result<(), HandlerError> {
        match command {
            SettingsCommand::Load => load_or_create(&self.ctx).await.map(|_| ()),
            SettingsCommand::Update => self.update(&payload).await,
        }
    }
}

//! # Garage
//!
//! The user's fleet, and which vehicle the cost projection is based on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::backend::{Query, fetch_all, insert_row, tables};
use crate::core::action::{Element, Payload};
use crate::core::model::{Shift, Vehicle, new_id};
use crate::core::notify::Severity;
use crate::core::router::HandlerError;
use crate::core::store::{Field, LoadingGuard};
use crate::modules::costs::recalculate;
use crate::modules::{AppContext, Module, payload_id};

pub const DEFAULT_VEHICLE_TYPE: &str = "owned";

/// The vehicle costs are projected for.
///
/// The open shift's vehicle if there is one, else the first rental, else
/// the first vehicle in the list.
pub fn target_vehicle<'a>(fleet: &'a [Vehicle], active_shift: Option<&Shift>) -> Option<&'a Vehicle> {
    let assigned = active_shift
        .filter(|shift| shift.is_open())
        .and_then(|shift| shift.vehicle_id.as_deref())
        .and_then(|id| fleet.iter().find(|v| v.id == id));

    assigned
        .or_else(|| fleet.iter().find(|v| v.is_rental()))
        .or_else(|| fleet.first())
}

/// Reloads the fleet into the store.
pub async fn reload_fleet(ctx: &AppContext) -> Result<(), HandlerError> {
    let user_id = ctx.user_id()?;
    let fleet: Vec<Vehicle> = fetch_all(
        ctx.backend.as_ref(),
        tables::VEHICLES,
        &Query::new().eq("user_id", &user_id).order_asc("name"),
    )
    .await?;
    ctx.store.set(Field::Fleet(fleet));
    Ok(())
}

fn cost_field(payload: &Payload, key: &str) -> Result<Option<f64>, HandlerError> {
    if payload.field(key).is_none_or(|v| v.is_null() || v == "") {
        return Ok(None);
    }
    match payload.number_field(key) {
        Some(n) if n >= 0.0 => Ok(Some(n)),
        _ => Err(HandlerError::validation(format!(
            "{} must be a number of zero or more",
            key.replace('_', " ")
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarageCommand {
    Add,
    Update,
    Delete,
    Load,
}

pub struct Garage {
    ctx: Arc<AppContext>,
}

impl Garage {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    async fn add(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let name = payload
            .str_field("name")
            .ok_or_else(|| HandlerError::validation("Give the vehicle a name"))?;
        let vehicle = Vehicle {
            id: new_id(),
            user_id,
            name: name.to_string(),
            vehicle_type: payload
                .str_field("type")
                .unwrap_or(DEFAULT_VEHICLE_TYPE)
                .to_ascii_lowercase(),
            weekly_cost: cost_field(payload, "weekly_cost")?.unwrap_or(0.0),
            monthly_wash_cost: cost_field(payload, "monthly_wash_cost")?.unwrap_or(0.0),
        };

        let _loading = LoadingGuard::new(&self.ctx.store);
        insert_row(self.ctx.backend.as_ref(), tables::VEHICLES, &vehicle).await?;
        reload_fleet(&self.ctx).await?;
        recalculate(&self.ctx).await?;
        self.ctx
            .notify(&format!("{} added to the garage", vehicle.name), Severity::Success);
        Ok(())
    }

    async fn update(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let id = payload_id(payload)?;

        let mut patch = Map::new();
        if payload.field("name").is_some() {
            let name = payload
                .str_field("name")
                .ok_or_else(|| HandlerError::validation("Give the vehicle a name"))?;
            patch.insert("name".into(), Value::from(name));
        }
        if let Some(kind) = payload.str_field("type") {
            patch.insert("type".into(), Value::from(kind.to_ascii_lowercase()));
        }
        for key in ["weekly_cost", "monthly_wash_cost"] {
            if let Some(cost) = cost_field(payload, key)? {
                patch.insert(key.into(), Value::from(cost));
            }
        }
        if patch.is_empty() {
            return Err(HandlerError::validation("Nothing to update"));
        }

        let _loading = LoadingGuard::new(&self.ctx.store);
        self.ctx
            .backend
            .update(
                tables::VEHICLES,
                &Query::new().eq("id", &id).eq("user_id", &user_id),
                Value::Object(patch),
            )
            .await?;
        reload_fleet(&self.ctx).await?;
        recalculate(&self.ctx).await?;
        self.ctx.notify("Vehicle updated", Severity::Success);
        Ok(())
    }

    async fn delete(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let id = payload_id(payload)?;
        let in_use = self.ctx.store.read(|s| {
            s.active_shift
                .as_ref()
                .is_some_and(|shift| shift.vehicle_id.as_deref() == Some(id.as_str()))
        });
        if in_use {
            return Err(HandlerError::validation(
                "This vehicle is assigned to the running shift",
            ));
        }

        let _loading = LoadingGuard::new(&self.ctx.store);
        self.ctx
            .backend
            .delete(
                tables::VEHICLES,
                &Query::new().eq("id", &id).eq("user_id", &user_id),
            )
            .await?;
        reload_fleet(&self.ctx).await?;
        recalculate(&self.ctx).await?;
        self.ctx.notify("Vehicle removed", Severity::Success);
        Ok(())
    }
}

#[async_trait]
impl Module for Garage {
    const NAMESPACE: &'static str = "garage";
    type Command = GarageCommand;

    fn parse(method: &str) -> Option<GarageCommand> {
        match method {
            "add" => Some(GarageCommand::Add),
            "update" => Some(GarageCommand::Update),
            "delete" => Some(GarageCommand::Delete),
            "load" => Some(GarageCommand::Load),
            _ => None,
        }
    }

    async fn handle(
        &self,
        command: GarageCommand,
        payload: Payload,
        _element: &Element,
    ) -> Result<(), HandlerError> {
        match command {
            GarageCommand::Add => self.add(&payload).await,
            GarageCommand::Update => self.update(&payload).await,
            GarageCommand::Delete => self.delete(&payload).await,
            GarageCommand::Load => reload_fleet(&self.ctx).await,
        }
    }
}

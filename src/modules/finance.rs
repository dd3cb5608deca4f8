//! # Finance
//!
//! Income and expense transactions. Expenses can be recorded at any time
//! and attach to the open shift if there is one. Income is only recorded
//! when a shift ends (see `shifts:end`), so `submit` refuses it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::info;

use crate::backend::{Query, insert_row, tables};
use crate::core::action::{Element, Payload};
use crate::core::model::{FUEL_KIND, Transaction, TxDirection, new_id};
use crate::core::notify::Severity;
use crate::core::router::HandlerError;
use crate::core::store::{Field, LoadingGuard};
use crate::modules::costs::refresh_shift_earnings;
use crate::modules::{AppContext, Module, payload_id};

pub const DEFAULT_EXPENSE_KIND: &str = "other";

/// A transaction as entered, before it gets an id and an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub direction: TxDirection,
    pub kind: String,
    pub amount: Option<f64>,
    pub volume: Option<f64>,
    pub odometer: Option<f64>,
    pub note: Option<String>,
}

impl TransactionDraft {
    /// Reads the draft from a form payload. `direction` falls back to the
    /// current toggle.
    pub fn from_payload(
        payload: &Payload,
        default_direction: TxDirection,
    ) -> Result<Self, HandlerError> {
        let direction = match payload.str_field("direction") {
            Some(raw) => raw.parse().map_err(HandlerError::Validation)?,
            None => default_direction,
        };
        Ok(Self {
            direction,
            kind: payload
                .str_field("kind")
                .unwrap_or(DEFAULT_EXPENSE_KIND)
                .to_ascii_lowercase(),
            amount: payload.number_field("amount"),
            volume: payload.number_field("volume"),
            odometer: payload.number_field("odometer"),
            note: payload.str_field("note").map(str::to_string),
        })
    }

    /// Checks the draft and returns the amount.
    pub fn validate(&self) -> Result<f64, HandlerError> {
        if self.direction == TxDirection::Income {
            return Err(HandlerError::validation(
                "Income is recorded when you end the shift",
            ));
        }
        let amount = self
            .amount
            .filter(|a| *a > 0.0)
            .ok_or_else(|| HandlerError::validation("Enter an amount greater than zero"))?;
        if self.kind == FUEL_KIND {
            if self.volume.is_none_or(|v| v <= 0.0) {
                return Err(HandlerError::validation("Fuel entries need the volume"));
            }
            if self.odometer.is_none_or(|o| o < 0.0) {
                return Err(HandlerError::validation(
                    "Fuel entries need the odometer reading",
                ));
            }
        }
        Ok(amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinanceCommand {
    Direction,
    Submit,
    Delete,
    Load,
}

pub struct Finance {
    ctx: Arc<AppContext>,
}

impl Finance {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn set_direction(&self, payload: &Payload) -> Result<(), HandlerError> {
        let raw = payload
            .as_str()
            .or_else(|| payload.str_field("direction"))
            .ok_or_else(|| HandlerError::validation("Choose income or expense"))?;
        let direction: TxDirection = raw.parse().map_err(HandlerError::Validation)?;
        self.ctx.store.set(Field::TxDirection(direction));
        Ok(())
    }

    async fn submit(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let default_direction = self.ctx.store.read(|s| s.tx_direction);
        let draft = TransactionDraft::from_payload(payload, default_direction)?;
        let amount = draft.validate()?;

        let _loading = LoadingGuard::new(&self.ctx.store);
        let shift_id = self
            .ctx
            .store
            .read(|s| s.active_shift.as_ref().map(|shift| shift.id.clone()));
        let tx = Transaction {
            id: new_id(),
            user_id,
            shift_id,
            direction: draft.direction,
            kind: draft.kind,
            amount,
            volume: draft.volume,
            odometer: draft.odometer,
            note: draft.note,
            created_at: Utc::now(),
        };
        insert_row(self.ctx.backend.as_ref(), tables::TRANSACTIONS, &tx).await?;
        info!("Recorded {} {} of {}", tx.kind, tx.direction, tx.amount);

        refresh_shift_earnings(&self.ctx).await?;
        self.ctx.notify("Expense saved", Severity::Success);
        Ok(())
    }

    async fn delete(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let id = payload_id(payload)?;
        let _loading = LoadingGuard::new(&self.ctx.store);
        self.ctx
            .backend
            .delete(
                tables::TRANSACTIONS,
                &Query::new().eq("id", &id).eq("user_id", &user_id),
            )
            .await?;
        refresh_shift_earnings(&self.ctx).await?;
        self.ctx.notify("Transaction deleted", Severity::Success);
        Ok(())
    }
}

#[async_trait]
impl Module for Finance {
    const NAMESPACE: &'static str = "finance";
    type Command = FinanceCommand;

    fn parse(method: &str) -> Option<FinanceCommand> {
        match method {
            "direction" => Some(FinanceCommand::Direction),
            "submit" => Some(FinanceCommand::Submit),
            "delete" => Some(FinanceCommand::Delete),
            "load" => Some(FinanceCommand::Load),
            _ => None,
        }
    }

    async fn handle(
        &self,
        command: FinanceCommand,
        payload: Payload,
        _element: &Element,
    ) -> Result<(), HandlerError> {
        match command {
            FinanceCommand::Direction => self.set_direction(&payload),
            FinanceCommand::Submit => self.submit(&payload).await,
            FinanceCommand::Delete => self.delete(&payload).await,
            FinanceCommand::Load => refresh_shift_earnings(&self.ctx).await,
        }
    }
}

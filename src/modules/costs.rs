//! # Costs
//!
//! Daily spend target, weekly rental progress, and live shift earnings.
//!
//! ```text
//! daily target   = round(monthly_fixed / 30 + weekly_vehicle / 7 + monthly_wash / 30)
//! shift earnings = round(max(income txs, recorded gross) - expense txs)
//! rental progress = min(100, earned / weekly_rate * 100)
//! ```
//!
//! The math is pure; [`recalculate`] loads what it needs and writes the
//! results into the store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use log::debug;

use crate::backend::{Query, fetch_all, insert_row, tables};
use crate::core::action::{Element, Payload};
use crate::core::model::{
    FixedCost, RentalProgress, Shift, Transaction, TxDirection, Vehicle, new_id,
};
use crate::core::notify::Severity;
use crate::core::router::HandlerError;
use crate::core::store::{Field, LoadingGuard};
use crate::modules::garage::target_vehicle;
use crate::modules::{AppContext, Module, payload_id};

pub const DAYS_PER_MONTH: f64 = 30.0;
pub const DAYS_PER_WEEK: f64 = 7.0;

pub fn calculate_daily_cost(monthly_fixed: f64, vehicle: Option<&Vehicle>) -> i64 {
    let (weekly, wash) = vehicle
        .map(|v| (v.weekly_cost, v.monthly_wash_cost))
        .unwrap_or((0.0, 0.0));
    (monthly_fixed / DAYS_PER_MONTH + weekly / DAYS_PER_WEEK + wash / DAYS_PER_MONTH).round()
        as i64
}

/// With no target (no rental), the week counts as covered.
pub fn weekly_rental_progress(earned: f64, target: f64) -> RentalProgress {
    if target <= 0.0 {
        return RentalProgress {
            earned: 0.0,
            target: 0.0,
            percentage: 100,
        };
    }
    let percentage = (earned.max(0.0) / target * 100.0).round().min(100.0) as u32;
    RentalProgress {
        earned,
        target,
        percentage,
    }
}

/// Net earnings of a shift from its transactions.
///
/// Income already folded into `gross_earnings` is not counted twice: the
/// larger of the two wins.
pub fn calculate_shift_earnings(shift: &Shift, transactions: &[Transaction]) -> i64 {
    let total = |direction: TxDirection| -> f64 {
        transactions
            .iter()
            .filter(|tx| tx.direction == direction)
            .filter(|tx| tx.shift_id.as_deref() == Some(shift.id.as_str()))
            .map(|tx| tx.amount)
            .sum()
    };
    let income = total(TxDirection::Income);
    let expenses = total(TxDirection::Expense);
    (income.max(shift.gross_earnings) - expenses).round() as i64
}

/// Midnight (UTC) of the most recent `week_start_day` (1 = Monday ... 7 = Sunday).
pub fn week_start(now: DateTime<Utc>, week_start_day: u8) -> DateTime<Utc> {
    let start_day = u32::from(week_start_day.clamp(1, 7));
    let today = now.weekday().number_from_monday();
    let back = (today + 7 - start_day) % 7;
    let date = now.date_naive() - Duration::days(i64::from(back));
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Reloads fixed costs and rewrites `dailyCost`, `rentalProgress` and the
/// open shift's earnings.
pub async fn recalculate(ctx: &AppContext) -> Result<(), HandlerError> {
    let user_id = ctx.user_id()?;
    let fixed: Vec<FixedCost> = fetch_all(
        ctx.backend.as_ref(),
        tables::FIXED_COSTS,
        &Query::new().eq("user_id", &user_id).order_asc("name"),
    )
    .await?;
    let monthly_fixed: f64 = fixed.iter().map(|c| c.monthly_amount).sum();
    ctx.store.set(Field::FixedCosts(fixed));

    let (target, week_start_day) = ctx.store.read(|s| {
        (
            target_vehicle(&s.fleet, s.active_shift.as_ref()).cloned(),
            s.settings.as_ref().map(|st| st.week_start_day).unwrap_or(1),
        )
    });

    let daily = calculate_daily_cost(monthly_fixed, target.as_ref());
    debug!("Daily cost target: {} (fixed {})", daily, monthly_fixed);
    ctx.store.set(Field::DailyCost(daily));

    let rental_rate = target
        .as_ref()
        .filter(|v| v.is_rental())
        .map(|v| v.weekly_cost)
        .unwrap_or(0.0);
    let earned = if rental_rate > 0.0 {
        week_income(ctx, &user_id, week_start(Utc::now(), week_start_day)).await?
    } else {
        0.0
    };
    ctx.store
        .set(Field::RentalProgress(weekly_rental_progress(earned, rental_rate)));

    refresh_shift_earnings(ctx).await
}

async fn week_income(
    ctx: &AppContext,
    user_id: &str,
    since: DateTime<Utc>,
) -> Result<f64, HandlerError> {
    let income: Vec<Transaction> = fetch_all(
        ctx.backend.as_ref(),
        tables::TRANSACTIONS,
        &Query::new()
            .eq("user_id", user_id)
            .eq("direction", TxDirection::Income)
            .gte("created_at", since.to_rfc3339()),
    )
    .await?;
    Ok(income.iter().map(|tx| tx.amount).sum())
}

/// Reloads the open shift's transactions and its live net earnings.
pub async fn refresh_shift_earnings(ctx: &AppContext) -> Result<(), HandlerError> {
    let Some(shift) = ctx.store.read(|s| s.active_shift.clone()) else {
        ctx.store.set(Field::ShiftTransactions(Vec::new()));
        ctx.store.set(Field::ShiftEarnings(0));
        return Ok(());
    };
    let transactions: Vec<Transaction> = fetch_all(
        ctx.backend.as_ref(),
        tables::TRANSACTIONS,
        &Query::new().eq("shift_id", &shift.id).order_desc("created_at"),
    )
    .await?;
    let earnings = calculate_shift_earnings(&shift, &transactions);
    ctx.store.set(Field::ShiftTransactions(transactions));
    ctx.store.set(Field::ShiftEarnings(earnings));
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostsCommand {
    Add,
    Delete,
    Recalculate,
}

pub struct Costs {
    ctx: Arc<AppContext>,
}

impl Costs {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    async fn add(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let name = payload
            .str_field("name")
            .ok_or_else(|| HandlerError::validation("Give the cost a name"))?;
        let monthly_amount = payload
            .number_field("monthly_amount")
            .filter(|amount| *amount > 0.0)
            .ok_or_else(|| HandlerError::validation("Monthly amount must be greater than zero"))?;

        let cost = FixedCost {
            id: new_id(),
            user_id,
            name: name.to_string(),
            monthly_amount,
        };
        let _loading = LoadingGuard::new(&self.ctx.store);
        insert_row(self.ctx.backend.as_ref(), tables::FIXED_COSTS, &cost).await?;
        recalculate(&self.ctx).await?;
        self.ctx.notify(&format!("Added {}", cost.name), Severity::Success);
        Ok(())
    }

    async fn delete(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        let id = payload_id(payload)?;
        let _loading = LoadingGuard::new(&self.ctx.store);
        self.ctx
            .backend
            .delete(
                tables::FIXED_COSTS,
                &Query::new().eq("id", &id).eq("user_id", &user_id),
            )
            .await?;
        recalculate(&self.ctx).await?;
        self.ctx.notify("Cost removed", Severity::Success);
        Ok(())
    }
}

#[async_trait]
impl Module for Costs {
    const NAMESPACE: &'static str = "costs";
    type Command = CostsCommand;

    fn parse(method: &str) -> Option<CostsCommand> {
        match method {
            "add" => Some(CostsCommand::Add),
            "delete" => Some(CostsCommand::Delete),
            "recalculate" => Some(CostsCommand::Recalculate),
            _ => None,
        }
    }

    async fn handle(
        &self,
        command: CostsCommand,
        payload: Payload,
        _element: &Element,
    ) -> Result<(), HandlerError> {
        match command {
            CostsCommand::Add => self.add(&payload).await,
            CostsCommand::Delete => self.delete(&payload).await,
            CostsCommand::Recalculate => recalculate(&self.ctx).await,
        }
    }
}

//! # Shifts
//!
//! A shift is a bounded work session: `active` → (`paused` ↔ `active`)* →
//! `completed`. At most one shift is open at a time.
//!
//! The elapsed-time display is driven by [`ShiftTimer`], which ticks once a
//! second while the shift is active and stops while it is paused, so the
//! shown time freezes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::info;
use serde_json::json;

use crate::backend::{Query, fetch_all, fetch_one, insert_row, tables};
use crate::core::action::{Element, Payload};
use crate::core::model::{Shift, ShiftStatus, Transaction, TxDirection, new_id};
use crate::core::notify::Severity;
use crate::core::router::HandlerError;
use crate::core::store::{Field, LoadingGuard};
use crate::modules::costs::{calculate_shift_earnings, recalculate, refresh_shift_earnings};
use crate::modules::garage::target_vehicle;
use crate::modules::{AppContext, Module};

pub const SHIFT_INCOME_KIND: &str = "shift";

/// Working time: wall time since start minus all pauses, including the
/// current one.
pub fn elapsed(shift: &Shift, now: DateTime<Utc>) -> Duration {
    let end = match shift.status {
        ShiftStatus::Completed => shift.ended_at.unwrap_or(now),
        ShiftStatus::Paused => shift.paused_at.unwrap_or(now),
        ShiftStatus::Active => now,
    };
    let worked = (end - shift.started_at) - Duration::seconds(shift.paused_seconds);
    worked.max(Duration::zero())
}

/// `HH:MM:SS`, hours not wrapped at 24.
pub fn format_elapsed(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// A number the user may leave blank. Anything else that is not a finite
/// number is a validation error.
fn optional_number(payload: &Payload, key: &str, label: &str) -> Result<Option<f64>, HandlerError> {
    if payload.field(key).is_none_or(|v| v.is_null() || v == "") {
        return Ok(None);
    }
    payload
        .number_field(key)
        .map(Some)
        .ok_or_else(|| HandlerError::validation(format!("{label} must be a number")))
}

/// One-second display timer for the open shift.
#[derive(Debug, Default)]
pub struct ShiftTimer {
    running: bool,
    last_second: Option<i64>,
}

impl ShiftTimer {
    /// Starts or halts the timer to match the shift's status.
    pub fn sync(&mut self, shift: Option<&Shift>) {
        let should_run = shift.is_some_and(|s| s.status == ShiftStatus::Active);
        if should_run != self.running {
            self.running = should_run;
            self.last_second = None;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True once per wall-clock second while running.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if !self.running {
            return false;
        }
        let second = now.timestamp();
        if self.last_second == Some(second) {
            return false;
        }
        self.last_second = Some(second);
        true
    }
}

/// Reloads the open shift (if any) and its earnings into the store.
pub async fn load_active(ctx: &AppContext) -> Result<(), HandlerError> {
    let user_id = ctx.user_id()?;
    let shift: Option<Shift> = fetch_one(
        ctx.backend.as_ref(),
        tables::SHIFTS,
        Query::new()
            .eq("user_id", &user_id)
            .neq("status", ShiftStatus::Completed.as_str())
            .order_desc("started_at"),
    )
    .await?;
    ctx.store.set(Field::ActiveShift(shift));
    refresh_shift_earnings(ctx).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftCommand {
    Start,
    Pause,
    Resume,
    End,
    Load,
}

pub struct Shifts {
    ctx: Arc<AppContext>,
}

impl Shifts {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn open_shift(&self) -> Result<Shift, HandlerError> {
        self.ctx
            .store
            .read(|s| s.active_shift.clone())
            .ok_or_else(|| HandlerError::validation("No shift is running"))
    }

    async fn save_status(&self, shift: &Shift) -> Result<(), HandlerError> {
        self.ctx
            .backend
            .update(
                tables::SHIFTS,
                &Query::new().eq("id", &shift.id),
                json!({
                    "status": shift.status,
                    "paused_at": shift.paused_at,
                    "paused_seconds": shift.paused_seconds,
                }),
            )
            .await?;
        self.ctx.store.set(Field::ActiveShift(Some(shift.clone())));
        Ok(())
    }

    async fn start(&self, payload: &Payload) -> Result<(), HandlerError> {
        let user_id = self.ctx.user_id()?;
        if self.ctx.store.read(|s| s.active_shift.is_some()) {
            return Err(HandlerError::validation("A shift is already running"));
        }
        let vehicle_id = match payload.str_field("vehicle_id") {
            Some(id) => Some(id.to_string()),
            None => self
                .ctx
                .store
                .read(|s| target_vehicle(&s.fleet, None).map(|v| v.id.clone())),
        };
        let odometer = optional_number(payload, "odometer", "Odometer")?;
        if odometer.is_some_and(|o| o < 0.0) {
            return Err(HandlerError::validation("Odometer cannot be negative"));
        }

        let _loading = LoadingGuard::new(&self.ctx.store);
        let shift = Shift::begin(user_id, vehicle_id, odometer, Utc::now());
        let saved = insert_row(self.ctx.backend.as_ref(), tables::SHIFTS, &shift).await?;
        info!("Shift {} started", saved.id);
        self.ctx.store.set(Field::ActiveShift(Some(saved)));

        // The target vehicle may have changed
        recalculate(&self.ctx).await?;
        self.ctx.notify("Shift started", Severity::Success);
        Ok(())
    }

    async fn pause(&self) -> Result<(), HandlerError> {
        let shift = self.open_shift()?;
        if shift.status != ShiftStatus::Active {
            return Err(HandlerError::validation("The shift is already paused"));
        }
        self.save_status(&shift.paused(Utc::now())).await?;
        self.ctx.notify("Shift paused", Severity::Info);
        Ok(())
    }

    async fn resume(&self) -> Result<(), HandlerError> {
        let shift = self.open_shift()?;
        if shift.status != ShiftStatus::Paused {
            return Err(HandlerError::validation("The shift is not paused"));
        }
        self.save_status(&shift.resumed(Utc::now())).await?;
        self.ctx.notify("Shift resumed", Severity::Info);
        Ok(())
    }

    async fn end(&self, payload: &Payload) -> Result<(), HandlerError> {
        let shift = self.open_shift()?;
        let income = optional_number(payload, "income", "Income")?.unwrap_or(0.0);
        if income < 0.0 {
            return Err(HandlerError::validation("Income cannot be negative"));
        }
        let end_odometer = optional_number(payload, "odometer", "Odometer")?;
        if let (Some(end), Some(start)) = (end_odometer, shift.start_odometer)
            && end < start
        {
            return Err(HandlerError::validation(
                "End odometer is lower than the start reading",
            ));
        }

        let _loading = LoadingGuard::new(&self.ctx.store);
        let now = Utc::now();
        // A paused shift ends at the moment it was paused
        let closed = match shift.status {
            ShiftStatus::Paused => shift.resumed(now),
            _ => shift.clone(),
        };

        let mut transactions: Vec<Transaction> = fetch_all(
            self.ctx.backend.as_ref(),
            tables::TRANSACTIONS,
            &Query::new().eq("shift_id", &closed.id),
        )
        .await?;

        // An end that failed part-way may already have recorded the income.
        // The retry overwrites that row instead of adding a second one.
        if income > 0.0 {
            let recorded = transactions.iter_mut().find(|tx| {
                tx.direction == TxDirection::Income && tx.kind == SHIFT_INCOME_KIND
            });
            match recorded {
                Some(tx) => {
                    self.ctx
                        .backend
                        .update(
                            tables::TRANSACTIONS,
                            &Query::new().eq("id", &tx.id),
                            json!({ "amount": income, "odometer": end_odometer }),
                        )
                        .await?;
                    tx.amount = income;
                    tx.odometer = end_odometer;
                }
                None => {
                    let tx = Transaction {
                        id: new_id(),
                        user_id: closed.user_id.clone(),
                        shift_id: Some(closed.id.clone()),
                        direction: TxDirection::Income,
                        kind: SHIFT_INCOME_KIND.to_string(),
                        amount: income,
                        volume: None,
                        odometer: end_odometer,
                        note: None,
                        created_at: now,
                    };
                    let saved =
                        insert_row(self.ctx.backend.as_ref(), tables::TRANSACTIONS, &tx).await?;
                    transactions.push(saved);
                }
            }
        }
        let income_total: f64 = transactions
            .iter()
            .filter(|tx| tx.direction == TxDirection::Income)
            .map(|tx| tx.amount)
            .sum();
        let gross = income_total.max(closed.gross_earnings);
        let net = calculate_shift_earnings(&closed, &transactions);

        self.ctx
            .backend
            .update(
                tables::SHIFTS,
                &Query::new().eq("id", &closed.id),
                json!({
                    "status": ShiftStatus::Completed,
                    "ended_at": now,
                    "paused_at": null,
                    "paused_seconds": closed.paused_seconds,
                    "end_odometer": end_odometer,
                    "gross_earnings": gross,
                    "net_earnings": net,
                }),
            )
            .await?;
        info!("Shift {} ended, net {}", closed.id, net);

        self.ctx.store.set(Field::ActiveShift(None));
        recalculate(&self.ctx).await?;
        self.ctx
            .notify(&format!("Shift ended. Net earnings: {net}"), Severity::Success);
        Ok(())
    }
}

#[async_trait]
impl Module for Shifts {
    const NAMESPACE: &'static str = "shifts";
    type Command = ShiftCommand;

    fn parse(method: &str) -> Option<ShiftCommand> {
        match method {
            "start" => Some(ShiftCommand::Start),
            "pause" => Some(ShiftCommand::Pause),
            "resume" => Some(ShiftCommand::Resume),
            "end" => Some(ShiftCommand::End),
            "load" => Some(ShiftCommand::Load),
            _ => None,
        }
    }

    async fn handle(
        &self,
        command: ShiftCommand,
        payload: Payload,
        _element: &Element,
    ) -> Result<(), HandlerError> {
        match command {
            ShiftCommand::Start => self.start(&payload).await,
            ShiftCommand::Pause => self.pause().await,
            ShiftCommand::Resume => self.resume().await,
            ShiftCommand::End => self.end(&payload).await,
            ShiftCommand::Load => load_active(&self.ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_context, vehicle};
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    async fn run(shifts: &Shifts, command: ShiftCommand, payload: Payload) -> Result<(), HandlerError> {
        shifts.handle(command, payload, &Element::default()).await
    }

    #[test]
    fn test_elapsed_active_and_paused() {
        let shift = Shift::begin("u1".into(), None, None, at(8, 0, 0));
        assert_eq!(format_elapsed(elapsed(&shift, at(9, 2, 3))), "01:02:03");

        // Paused at 9:00, the clock stays at 1h no matter how late it gets
        let paused = shift.paused(at(9, 0, 0));
        assert_eq!(format_elapsed(elapsed(&paused, at(9, 30, 0))), "01:00:00");
        assert_eq!(format_elapsed(elapsed(&paused, at(11, 0, 0))), "01:00:00");

        // Resumed at 9:30: the 30 minute pause is excluded
        let resumed = paused.resumed(at(9, 30, 0));
        assert_eq!(format_elapsed(elapsed(&resumed, at(10, 0, 0))), "01:30:00");
    }

    #[test]
    fn test_format_elapsed_long_shift() {
        assert_eq!(format_elapsed(Duration::seconds(26 * 3600 + 5)), "26:00:05");
        assert_eq!(format_elapsed(Duration::seconds(-3)), "00:00:00");
    }

    #[test]
    fn test_timer_ticks_once_per_second_while_active() {
        let mut timer = ShiftTimer::default();
        let shift = Shift::begin("u1".into(), None, None, at(8, 0, 0));

        assert!(!timer.tick(at(8, 0, 1)));
        timer.sync(Some(&shift));
        assert!(timer.is_running());
        assert!(timer.tick(at(8, 0, 1)));
        assert!(!timer.tick(at(8, 0, 1)));
        assert!(timer.tick(at(8, 0, 2)));

        timer.sync(Some(&shift.paused(at(8, 0, 2))));
        assert!(!timer.is_running());
        assert!(!timer.tick(at(8, 0, 3)));

        timer.sync(None);
        assert!(!timer.is_running());
    }

    #[tokio::test]
    async fn test_start_uses_target_vehicle() {
        let (ctx, backend, notifier) = test_context();
        ctx.store.set(Field::Fleet(vec![
            vehicle("own", "owned", 0.0),
            vehicle("rent", "rental", 210.0),
        ]));
        let shifts = Shifts::new(ctx.clone());

        run(&shifts, ShiftCommand::Start, Payload::Json(json!({"odometer": 1200})))
            .await
            .unwrap();

        let shift = ctx.store.read(|s| s.active_shift.clone()).unwrap();
        assert_eq!(shift.vehicle_id.as_deref(), Some("rent"));
        assert_eq!(shift.start_odometer, Some(1200.0));
        assert_eq!(backend.rows(tables::SHIFTS).len(), 1);
        assert_eq!(ctx.store.read(|s| s.daily_cost), 30);
        assert_eq!(notifier.messages()[0].0, "Shift started");
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let (ctx, _, _) = test_context();
        let shifts = Shifts::new(ctx);
        run(&shifts, ShiftCommand::Start, Payload::None).await.unwrap();

        let err = run(&shifts, ShiftCommand::Start, Payload::None).await.unwrap_err();
        assert_eq!(err.user_message(), "A shift is already running");
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let (ctx, backend, _) = test_context();
        let shifts = Shifts::new(ctx.clone());
        run(&shifts, ShiftCommand::Start, Payload::None).await.unwrap();

        assert!(run(&shifts, ShiftCommand::Resume, Payload::None).await.is_err());
        run(&shifts, ShiftCommand::Pause, Payload::None).await.unwrap();
        assert_eq!(
            ctx.store.read(|s| s.active_shift.as_ref().map(|sh| sh.status)),
            Some(ShiftStatus::Paused)
        );
        assert_eq!(backend.rows(tables::SHIFTS)[0]["status"], json!("paused"));
        assert!(run(&shifts, ShiftCommand::Pause, Payload::None).await.is_err());

        run(&shifts, ShiftCommand::Resume, Payload::None).await.unwrap();
        assert_eq!(backend.rows(tables::SHIFTS)[0]["status"], json!("active"));
    }

    #[tokio::test]
    async fn test_end_records_income_and_net() {
        let (ctx, backend, notifier) = test_context();
        let shifts = Shifts::new(ctx.clone());
        run(&shifts, ShiftCommand::Start, Payload::Json(json!({"odometer": 100})))
            .await
            .unwrap();
        let shift_id = ctx.store.read(|s| s.active_shift.as_ref().unwrap().id.clone());
        backend.seed(
            tables::TRANSACTIONS,
            json!({
                "id": "e1", "user_id": "u1", "shift_id": shift_id, "direction": "expense",
                "kind": "fuel", "amount": 40.0, "volume": 20.0, "odometer": 150.0,
                "created_at": Utc::now()
            }),
        );

        run(&shifts, ShiftCommand::End, Payload::Json(json!({"income": 150, "odometer": 260})))
            .await
            .unwrap();

        let row = &backend.rows(tables::SHIFTS)[0];
        assert_eq!(row["status"], json!("completed"));
        assert_eq!(row["gross_earnings"], json!(150.0));
        assert_eq!(row["net_earnings"], json!(110));
        assert_eq!(row["end_odometer"], json!(260.0));
        assert!(ctx.store.read(|s| s.active_shift.is_none()));
        assert_eq!(ctx.store.read(|s| s.shift_earnings), 0);
        assert_eq!(
            notifier.messages().last().unwrap().0,
            "Shift ended. Net earnings: 110"
        );
    }

    #[tokio::test]
    async fn test_retried_end_records_income_once() {
        let (ctx, backend, _) = test_context();
        let shifts = Shifts::new(ctx.clone());
        run(&shifts, ShiftCommand::Start, Payload::None).await.unwrap();

        // The transactions read and the income insert go through, the
        // shift update does not
        backend.fail_after(2, "lost");
        let err = run(&shifts, ShiftCommand::End, Payload::Json(json!({"income": 100})))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "lost");
        assert!(ctx.store.read(|s| s.active_shift.is_some()));

        backend.recover();
        run(&shifts, ShiftCommand::End, Payload::Json(json!({"income": 100})))
            .await
            .unwrap();

        let income_rows: Vec<_> = backend
            .rows(tables::TRANSACTIONS)
            .into_iter()
            .filter(|row| row["direction"] == json!("income"))
            .collect();
        assert_eq!(income_rows.len(), 1);
        assert_eq!(income_rows[0]["amount"], json!(100.0));
        let row = &backend.rows(tables::SHIFTS)[0];
        assert_eq!(row["gross_earnings"], json!(100.0));
        assert_eq!(row["net_earnings"], json!(100));
    }

    #[tokio::test]
    async fn test_non_finite_numbers_rejected() {
        let (ctx, backend, _) = test_context();
        let shifts = Shifts::new(ctx.clone());

        let err = run(&shifts, ShiftCommand::Start, Payload::Json(json!({"odometer": "NaN"})))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Odometer must be a number");
        assert!(backend.rows(tables::SHIFTS).is_empty());

        run(&shifts, ShiftCommand::Start, Payload::Json(json!({"odometer": ""})))
            .await
            .unwrap();
        let err = run(&shifts, ShiftCommand::End, Payload::Json(json!({"income": "inf"})))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Income must be a number");
        assert!(ctx.store.read(|s| s.active_shift.is_some()));
        assert!(backend.rows(tables::TRANSACTIONS).is_empty());
    }

    #[tokio::test]
    async fn test_end_rejects_lower_odometer() {
        let (ctx, backend, _) = test_context();
        let shifts = Shifts::new(ctx.clone());
        run(&shifts, ShiftCommand::Start, Payload::Json(json!({"odometer": 500})))
            .await
            .unwrap();

        let err = run(&shifts, ShiftCommand::End, Payload::Json(json!({"odometer": 400})))
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::Validation(_)));
        assert!(ctx.store.read(|s| s.active_shift.is_some()));
        assert!(backend.rows(tables::TRANSACTIONS).is_empty());
    }

    #[tokio::test]
    async fn test_load_active_finds_open_shift() {
        let (ctx, backend, _) = test_context();
        let mut done = Shift::begin("u1".into(), None, None, at(6, 0, 0));
        done.status = ShiftStatus::Completed;
        let open = Shift::begin("u1".into(), None, None, at(8, 0, 0)).paused(at(9, 0, 0));
        backend.seed(tables::SHIFTS, serde_json::to_value(&done).unwrap());
        backend.seed(tables::SHIFTS, serde_json::to_value(&open).unwrap());

        load_active(&ctx).await.unwrap();

        assert_eq!(ctx.store.read(|s| s.active_shift.clone()), Some(open));
    }
}

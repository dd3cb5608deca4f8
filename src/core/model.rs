//! # Domain Records
//!
//! Rows as the backend stores them. Field names match the table columns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

// ============================================================================
// Garage
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Free text; `"rental"` marks vehicles paid by the week.
    #[serde(rename = "type", default)]
    pub vehicle_type: String,
    #[serde(default)]
    pub weekly_cost: f64,
    #[serde(default)]
    pub monthly_wash_cost: f64,
}

impl Vehicle {
    pub fn is_rental(&self) -> bool {
        self.vehicle_type.eq_ignore_ascii_case("rental")
    }
}

// ============================================================================
// Shifts
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Active,
    Paused,
    Completed,
}

impl ShiftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ShiftStatus::Active => "active",
            ShiftStatus::Paused => "paused",
            ShiftStatus::Completed => "completed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Shift {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    pub status: ShiftStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    /// Total length of completed pauses.
    #[serde(default)]
    pub paused_seconds: i64,
    #[serde(default)]
    pub start_odometer: Option<f64>,
    #[serde(default)]
    pub end_odometer: Option<f64>,
    #[serde(default)]
    pub gross_earnings: f64,
    #[serde(default)]
    pub net_earnings: f64,
}

impl Shift {
    pub fn begin(
        user_id: String,
        vehicle_id: Option<String>,
        start_odometer: Option<f64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            user_id,
            vehicle_id,
            status: ShiftStatus::Active,
            started_at: now,
            ended_at: None,
            paused_at: None,
            paused_seconds: 0,
            start_odometer,
            end_odometer: None,
            gross_earnings: 0.0,
            net_earnings: 0.0,
        }
    }

    /// Active or paused.
    pub fn is_open(&self) -> bool {
        self.status != ShiftStatus::Completed
    }

    pub fn paused(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: ShiftStatus::Paused,
            paused_at: Some(now),
            ..self.clone()
        }
    }

    /// Folds the current pause into `paused_seconds`.
    pub fn resumed(&self, now: DateTime<Utc>) -> Self {
        let pause = self
            .paused_at
            .map(|at| (now - at).num_seconds().max(0))
            .unwrap_or(0);
        Self {
            status: ShiftStatus::Active,
            paused_at: None,
            paused_seconds: self.paused_seconds + pause,
            ..self.clone()
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    Income,
    #[default]
    Expense,
}

impl TxDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TxDirection::Income => "income",
            TxDirection::Expense => "expense",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TxDirection::Income => TxDirection::Expense,
            TxDirection::Expense => TxDirection::Income,
        }
    }
}

impl fmt::Display for TxDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TxDirection::Income),
            "expense" => Ok(TxDirection::Expense),
            other => Err(format!("unknown transaction direction '{other}'")),
        }
    }
}

pub const FUEL_KIND: &str = "fuel";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub shift_id: Option<String>,
    pub direction: TxDirection,
    pub kind: String,
    pub amount: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub odometer: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Costs & Settings
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FixedCost {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub monthly_amount: f64,
}

/// Progress of this week's earnings towards the rental's weekly rate.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RentalProgress {
    pub earned: f64,
    pub target: f64,
    pub percentage: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub user_id: String,
    pub timezone: String,
    /// 1 = Monday ... 7 = Sunday.
    pub week_start_day: u8,
    pub shift_target_hours: f64,
    pub currency: String,
    pub daily_income_goal: f64,
}

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_WEEK_START_DAY: u8 = 1;
pub const DEFAULT_SHIFT_TARGET_HOURS: f64 = 10.0;
pub const DEFAULT_CURRENCY: &str = "EUR";

impl Settings {
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            week_start_day: DEFAULT_WEEK_START_DAY,
            shift_target_hours: DEFAULT_SHIFT_TARGET_HOURS,
            currency: DEFAULT_CURRENCY.to_string(),
            daily_income_goal: 0.0,
        }
    }
}

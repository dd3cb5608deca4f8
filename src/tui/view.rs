//! # Dashboard View Model
//!
//! Pure translation of [`SessionState`] into display strings. No ratatui
//! here, so everything the screen shows can be tested without a terminal.

use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::core::model::{DEFAULT_CURRENCY, DEFAULT_SHIFT_TARGET_HOURS, ShiftStatus, TxDirection};
use crate::core::store::SessionState;
use crate::modules::garage::target_vehicle;
use crate::modules::shifts::{elapsed, format_elapsed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftPhase {
    Idle,
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftView {
    pub phase: ShiftPhase,
    pub elapsed: String,
    pub vehicle: String,
    /// Share of the daily shift target worked so far, 0..=100.
    pub target_percent: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RentalView {
    pub label: String,
    pub percent: u16,
}

/// One line of a list, with the id of the record it shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub user: Option<String>,
    pub shift: ShiftView,
    pub daily_cost: String,
    pub shift_earnings: String,
    pub income_goal: Option<String>,
    pub rental: Option<RentalView>,
    pub direction: TxDirection,
    pub transactions: Vec<RowView>,
    pub fleet: Vec<RowView>,
    pub fixed_costs: Vec<RowView>,
    pub loading: bool,
}

pub fn format_money(amount: f64, currency: &str) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0} {currency}")
    } else {
        format!("{amount:.2} {currency}")
    }
}

/// Truncates to `max_width` terminal columns, ending with `…` when cut.
pub fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > max_width - 1 {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

impl DashboardView {
    pub fn build(state: &SessionState, now: DateTime<Utc>) -> Self {
        let settings = state.settings.as_ref();
        let currency = settings
            .map(|s| s.currency.as_str())
            .unwrap_or(DEFAULT_CURRENCY);
        let target_hours = settings
            .map(|s| s.shift_target_hours)
            .unwrap_or(DEFAULT_SHIFT_TARGET_HOURS);

        let shift = match &state.active_shift {
            Some(shift) => {
                let worked = elapsed(shift, now);
                let hours = worked.num_seconds() as f64 / 3600.0;
                let vehicle = shift
                    .vehicle_id
                    .as_deref()
                    .and_then(|id| state.fleet.iter().find(|v| v.id == id))
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| "no vehicle".to_string());
                ShiftView {
                    phase: match shift.status {
                        ShiftStatus::Paused => ShiftPhase::Paused,
                        _ => ShiftPhase::Active,
                    },
                    elapsed: format_elapsed(worked),
                    vehicle,
                    target_percent: ((hours / target_hours * 100.0).round() as u16).min(100),
                }
            }
            None => ShiftView {
                phase: ShiftPhase::Idle,
                elapsed: format_elapsed(chrono::Duration::zero()),
                vehicle: target_vehicle(&state.fleet, None)
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| "no vehicle".to_string()),
                target_percent: 0,
            },
        };

        let rental = (state.rental_progress.target > 0.0).then(|| RentalView {
            label: format!(
                "{} / {} this week",
                format_money(state.rental_progress.earned, currency),
                format_money(state.rental_progress.target, currency)
            ),
            percent: state.rental_progress.percentage.min(100) as u16,
        });

        let transactions = state
            .shift_transactions
            .iter()
            .map(|tx| {
                let sign = match tx.direction {
                    TxDirection::Income => '+',
                    TxDirection::Expense => '-',
                };
                let mut text = format!(
                    "{} {}{} {}",
                    tx.created_at.format("%H:%M"),
                    sign,
                    format_money(tx.amount, currency),
                    tx.kind
                );
                if let Some(volume) = tx.volume {
                    text.push_str(&format!(" ({volume} L)"));
                }
                if let Some(note) = &tx.note {
                    text.push_str(&format!(" · {note}"));
                }
                RowView {
                    id: tx.id.clone(),
                    text,
                }
            })
            .collect();

        let fleet = state
            .fleet
            .iter()
            .map(|v| RowView {
                id: v.id.clone(),
                text: if v.weekly_cost > 0.0 {
                    format!(
                        "{} [{}] {}/wk",
                        v.name,
                        v.vehicle_type,
                        format_money(v.weekly_cost, currency)
                    )
                } else {
                    format!("{} [{}]", v.name, v.vehicle_type)
                },
            })
            .collect();

        let fixed_costs = state
            .fixed_costs
            .iter()
            .map(|c| RowView {
                id: c.id.clone(),
                text: format!("{} {}/mo", c.name, format_money(c.monthly_amount, currency)),
            })
            .collect();

        Self {
            user: state
                .user
                .as_ref()
                .map(|u| u.email.clone().unwrap_or_else(|| u.id.clone())),
            shift,
            daily_cost: format!("{} {}", state.daily_cost, currency),
            shift_earnings: format!("{} {}", state.shift_earnings, currency),
            income_goal: settings
                .filter(|s| s.daily_income_goal > 0.0)
                .map(|s| format_money(s.daily_income_goal, currency)),
            rental,
            direction: state.tx_direction,
            transactions,
            fleet,
            fixed_costs,
            loading: state.loading,
        }
    }
}

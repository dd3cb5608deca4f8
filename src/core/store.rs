//! # Session Store
//!
//! The single source of truth for session data. Every write goes through
//! [`Store::set`], which stores the value and then synchronously notifies
//! the listeners subscribed to that field before returning.
//!
//! ```text
//! SessionState
//! ├── user: Option<User>            // signed-in identity
//! ├── fleet: Vec<Vehicle>           // garage
//! ├── active_shift: Option<Shift>   // open shift (active or paused)
//! ├── daily_cost: i64               // daily spend target
//! ├── shift_earnings: i64           // live net earnings of the open shift
//! ├── tx_direction: TxDirection     // income / expense toggle
//! ├── loading: bool                 // a backend write is in progress
//! ├── settings: Option<Settings>
//! ├── fixed_costs: Vec<FixedCost>
//! ├── rental_progress: RentalProgress
//! ├── shift_transactions: Vec<Transaction>
//! └── extras: BTreeMap              // fields outside the known set
//! ```
//!
//! There is no batching: N writes produce N notifications.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::core::model::{
    FixedCost, RentalProgress, Settings, Shift, Transaction, TxDirection, User, Vehicle,
};

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub user: Option<User>,
    pub fleet: Vec<Vehicle>,
    pub active_shift: Option<Shift>,
    pub daily_cost: i64,
    pub shift_earnings: i64,
    pub tx_direction: TxDirection,
    pub loading: bool,
    pub settings: Option<Settings>,
    pub fixed_costs: Vec<FixedCost>,
    pub rental_progress: RentalProgress,
    pub shift_transactions: Vec<Transaction>,
    #[serde(skip)]
    pub extras: BTreeMap<String, Value>,
}

/// Names a field of [`SessionState`]. Listeners are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    User,
    Fleet,
    ActiveShift,
    DailyCost,
    ShiftEarnings,
    TxDirection,
    Loading,
    Settings,
    FixedCosts,
    RentalProgress,
    ShiftTransactions,
    Custom(String),
}

impl FieldKey {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKey::User => "user",
            FieldKey::Fleet => "fleet",
            FieldKey::ActiveShift => "activeShift",
            FieldKey::DailyCost => "dailyCost",
            FieldKey::ShiftEarnings => "shiftEarnings",
            FieldKey::TxDirection => "txDirection",
            FieldKey::Loading => "loading",
            FieldKey::Settings => "settings",
            FieldKey::FixedCosts => "fixedCosts",
            FieldKey::RentalProgress => "rentalProgress",
            FieldKey::ShiftTransactions => "shiftTransactions",
            FieldKey::Custom(name) => name,
        }
    }

    /// Any name is accepted; unknown names become `Custom`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "user" => FieldKey::User,
            "fleet" => FieldKey::Fleet,
            "activeShift" => FieldKey::ActiveShift,
            "dailyCost" => FieldKey::DailyCost,
            "shiftEarnings" => FieldKey::ShiftEarnings,
            "txDirection" => FieldKey::TxDirection,
            "loading" => FieldKey::Loading,
            "settings" => FieldKey::Settings,
            "fixedCosts" => FieldKey::FixedCosts,
            "rentalProgress" => FieldKey::RentalProgress,
            "shiftTransactions" => FieldKey::ShiftTransactions,
            other => FieldKey::Custom(other.to_string()),
        }
    }
}

/// A write: which field, and its new value.
#[derive(Debug, Clone)]
pub enum Field {
    User(Option<User>),
    Fleet(Vec<Vehicle>),
    ActiveShift(Option<Shift>),
    DailyCost(i64),
    ShiftEarnings(i64),
    TxDirection(TxDirection),
    Loading(bool),
    Settings(Option<Settings>),
    FixedCosts(Vec<FixedCost>),
    RentalProgress(RentalProgress),
    ShiftTransactions(Vec<Transaction>),
    Custom(String, Value),
}

impl Field {
    pub fn key(&self) -> FieldKey {
        match self {
            Field::User(_) => FieldKey::User,
            Field::Fleet(_) => FieldKey::Fleet,
            Field::ActiveShift(_) => FieldKey::ActiveShift,
            Field::DailyCost(_) => FieldKey::DailyCost,
            Field::ShiftEarnings(_) => FieldKey::ShiftEarnings,
            Field::TxDirection(_) => FieldKey::TxDirection,
            Field::Loading(_) => FieldKey::Loading,
            Field::Settings(_) => FieldKey::Settings,
            Field::FixedCosts(_) => FieldKey::FixedCosts,
            Field::RentalProgress(_) => FieldKey::RentalProgress,
            Field::ShiftTransactions(_) => FieldKey::ShiftTransactions,
            Field::Custom(name, _) => FieldKey::Custom(name.clone()),
        }
    }
}

impl SessionState {
    fn apply(&mut self, field: Field) {
        match field {
            Field::User(v) => self.user = v,
            Field::Fleet(v) => self.fleet = v,
            Field::ActiveShift(v) => self.active_shift = v,
            Field::DailyCost(v) => self.daily_cost = v,
            Field::ShiftEarnings(v) => self.shift_earnings = v,
            Field::TxDirection(v) => self.tx_direction = v,
            Field::Loading(v) => self.loading = v,
            Field::Settings(v) => self.settings = v,
            Field::FixedCosts(v) => self.fixed_costs = v,
            Field::RentalProgress(v) => self.rental_progress = v,
            Field::ShiftTransactions(v) => self.shift_transactions = v,
            Field::Custom(name, value) => {
                self.extras.insert(name, value);
            }
        }
    }

    fn value_of(&self, key: &FieldKey) -> Value {
        let value = match key {
            FieldKey::User => serde_json::to_value(&self.user),
            FieldKey::Fleet => serde_json::to_value(&self.fleet),
            FieldKey::ActiveShift => serde_json::to_value(&self.active_shift),
            FieldKey::DailyCost => serde_json::to_value(self.daily_cost),
            FieldKey::ShiftEarnings => serde_json::to_value(self.shift_earnings),
            FieldKey::TxDirection => serde_json::to_value(self.tx_direction),
            FieldKey::Loading => serde_json::to_value(self.loading),
            FieldKey::Settings => serde_json::to_value(&self.settings),
            FieldKey::FixedCosts => serde_json::to_value(&self.fixed_costs),
            FieldKey::RentalProgress => serde_json::to_value(self.rental_progress),
            FieldKey::ShiftTransactions => serde_json::to_value(&self.shift_transactions),
            FieldKey::Custom(name) => Ok(self.extras.get(name).cloned().unwrap_or(Value::Null)),
        };
        value.unwrap_or(Value::Null)
    }
}

type Listener = Box<dyn Fn(&FieldKey, &SessionState) + Send + Sync>;

struct Subscription {
    /// `None` listens to every field.
    key: Option<FieldKey>,
    listener: Listener,
}

#[derive(Default)]
pub struct Store {
    state: Mutex<SessionState>,
    subscriptions: Mutex<Vec<Subscription>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the value, then notifies the field's listeners.
    ///
    /// Listeners run while the write is in progress and must not call back
    /// into the store.
    pub fn set(&self, field: Field) {
        let key = field.key();
        let mut state = lock(&self.state);
        state.apply(field);
        let subscriptions = lock(&self.subscriptions);
        for sub in subscriptions.iter() {
            if sub.key.as_ref().is_none_or(|k| *k == key) {
                (sub.listener)(&key, &state);
            }
        }
    }

    /// Untyped read by field name. Unknown names that were never set read as `null`.
    pub fn get(&self, name: &str) -> Value {
        lock(&self.state).value_of(&FieldKey::from_name(name))
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&lock(&self.state))
    }

    pub fn snapshot(&self) -> SessionState {
        lock(&self.state).clone()
    }

    pub fn subscribe(
        &self,
        key: FieldKey,
        listener: impl Fn(&FieldKey, &SessionState) + Send + Sync + 'static,
    ) {
        lock(&self.subscriptions).push(Subscription {
            key: Some(key),
            listener: Box::new(listener),
        });
    }

    pub fn subscribe_all(
        &self,
        listener: impl Fn(&FieldKey, &SessionState) + Send + Sync + 'static,
    ) {
        lock(&self.subscriptions).push(Subscription {
            key: None,
            listener: Box::new(listener),
        });
    }
}

/// Sets `loading` for as long as it lives.
pub struct LoadingGuard<'a> {
    store: &'a Store,
}

impl<'a> LoadingGuard<'a> {
    pub fn new(store: &'a Store) -> Self {
        store.set(Field::Loading(true));
        Self { store }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.set(Field::Loading(false));
    }
}

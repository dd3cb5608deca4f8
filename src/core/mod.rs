//! # Core
//!
//! The pieces every screen and module share. Nothing here knows about a
//! terminal or about HTTP.
//!
//! ```text
//!     ┌────────────┐  click   ┌────────────┐  handler   ┌────────────┐
//!     │    TUI     │ ───────► │   Router   │ ─────────► │  Modules   │
//!     │ (ratatui)  │          │ (one busy  │            │ (shifts,   │
//!     └─────▲──────┘          │   flag)    │            │  finance…) │
//!           │                 └─────┬──────┘            └─────┬──────┘
//!           │ field changed         │ errors                  │ writes
//!           │                 ┌─────▼──────┐            ┌─────▼──────┐
//!           └──────────────── │   Store    │ ◄───────── │  Backend   │
//!                             │ + Notifier │   results  │  (REST)    │
//!                             └────────────┘            └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`action`]: action tags, payloads, and the clickable element tree
//! - [`router`]: resolves clicks to handlers, one at a time
//! - [`store`]: the observable session state
//! - [`model`]: rows as the backend stores them
//! - [`notify`]: user-facing notifications
//! - [`config`]: `~/.shiftlog/config.toml`, env vars, CLI flags

pub mod action;
pub mod config;
pub mod model;
pub mod notify;
pub mod router;
pub mod store;

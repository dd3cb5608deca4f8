//! Shiftlog library exports for testing

pub mod app;
pub mod backend;
pub mod core;
pub mod modules;
pub mod tui;

#[cfg(test)]
pub mod test_support;

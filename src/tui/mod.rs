//! # TUI Adapter
//!
//! The ratatui-specific layer. Handles terminal I/O, renders the dashboard,
//! and turns mouse clicks and hotkeys into click events for the router.
//!
//! This is the only module that knows about ratatui and crossterm.
//!
//! ## Click Path
//!
//! ```text
//! mouse/hotkey ─► Screen hit ─► ClickEvent(label element) ─► router.prepare
//!                    │                                           │ (sync: busy check)
//!                    └─► Form(kind) ─► overlay ─► prepare_tag     ▼
//!                                                          tokio::spawn(router.run)
//! ```
//!
//! `prepare` runs inline on the frame loop so a second click while an action
//! is in flight is rejected before anything is spawned.
//!
//! ## Redraw Strategy
//!
//! The loop only redraws when something changed:
//!
//! - a store field was written (the store listener sets a dirty flag),
//! - the shift timer ticked (once a second while a shift is active),
//! - a toast appeared or expired, or the busy indicator changed,
//! - a terminal event arrived.
//!
//! While an action is in flight the loop polls faster to animate the spinner.

mod event;
mod form;
mod ui;
pub mod view;

use log::{debug, info};
use std::io::stdout;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;

use crate::app::App;
use crate::core::action::ClickEvent;
use crate::core::notify::{Notifier, Severity, ToastQueue};
use crate::core::router::{DispatchError, Prepared, Router};
use crate::modules::shifts::ShiftTimer;
use crate::tui::event::{TuiEvent, poll_event_immediate, poll_event_timeout};
use crate::tui::form::{FormEvent, FormKind, FormState};
use crate::tui::ui::{Hit, Overlay, Screen};
use crate::tui::view::DashboardView;

/// TUI-specific presentation state (not part of the session store)
#[derive(Default)]
pub struct TuiState {
    pub screen: Screen,
    pub form: Option<FormState>,
    pub timer: ShiftTimer,
}

struct TerminalModeGuard;

impl TerminalModeGuard {
    fn new() -> std::io::Result<Self> {
        execute!(stdout(), EnableMouseCapture)?;
        info!("Terminal modes enabled (mouse)");
        Ok(Self)
    }
}

impl Drop for TerminalModeGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), DisableMouseCapture);
    }
}

/// Hands a prepared action to the runtime.
fn spawn_run(router: &Arc<Router>, prepared: Prepared) {
    debug!("Spawning '{}'", prepared.tag());
    let router = router.clone();
    tokio::spawn(async move {
        router.run(prepared).await;
    });
}

fn log_rejection(e: &DispatchError) {
    match e {
        DispatchError::NoAction => {}
        other => debug!("Click not dispatched: {}", other),
    }
}

/// Opens a form, or dispatches the element a hit resolves to.
fn activate(hit: Hit, app: &App, tui: &mut TuiState) {
    match hit {
        Hit::Form(FormKind::Settings) => {
            let current = app.ctx.store.read(|s| s.settings.clone());
            tui.form = Some(FormState::settings(current.as_ref()));
        }
        Hit::Form(kind) => tui.form = Some(FormState::new(kind)),
        Hit::Element(target) => {
            let mut click = ClickEvent::new(target);
            match app.router.prepare(&tui.screen.elements, &mut click) {
                Ok(prepared) => spawn_run(&app.router, prepared),
                Err(e) => log_rejection(&e),
            }
        }
    }
}

/// Handles one event. Returns true to quit.
fn handle_event(event: TuiEvent, app: &App, tui: &mut TuiState) -> bool {
    if matches!(event, TuiEvent::ForceQuit) {
        return true;
    }

    // An open form takes all keyboard input
    if let Some(form) = tui.form.as_mut() {
        match form.handle_event(&event) {
            Some(FormEvent::Dismiss) => tui.form = None,
            Some(FormEvent::Submit { action, payload }) => {
                match app.router.prepare_tag(action, Some(&payload)) {
                    Ok(prepared) => {
                        spawn_run(&app.router, prepared);
                        tui.form = None;
                    }
                    // Busy: keep the form so the input is not lost
                    Err(e) => log_rejection(&e),
                }
            }
            None => {}
        }
        return false;
    }

    match event {
        TuiEvent::InputChar('q') => return true,
        TuiEvent::Refresh => {
            if let Some(hit) = tui.screen.hotkey('u') {
                activate(hit, app, tui);
            }
        }
        TuiEvent::InputChar(c) => {
            if let Some(hit) = tui.screen.hotkey(c) {
                activate(hit, app, tui);
            }
        }
        TuiEvent::MouseClick(column, row) => {
            if let Some(hit) = tui.screen.hit_test(column, row) {
                activate(hit, app, tui);
            }
        }
        _ => {}
    }
    false
}

pub fn run(app: &App, toasts: Arc<ToastQueue>) -> std::io::Result<()> {
    let mut tui = TuiState::default();

    // Any store write marks the frame dirty
    let dirty = Arc::new(AtomicBool::new(true));
    let flag = dirty.clone();
    app.ctx.store.subscribe_all(move |key, _| {
        debug!("Store field '{}' changed", key.as_str());
        flag.store(true, Ordering::Release);
    });

    let mut terminal = ratatui::init();
    let _terminal_mode_guard = match TerminalModeGuard::new() {
        Ok(guard) => Some(guard),
        Err(e) => {
            toasts.notify(&format!("Mouse support unavailable: {e}"), Severity::Info);
            None
        }
    };

    let start_time = Instant::now();
    let mut last_busy: Option<String> = None;

    loop {
        let state = app.ctx.store.snapshot();
        tui.timer.sync(state.active_shift.as_ref());
        let busy = app.router.in_flight().map(|tag| tag.to_string());

        let mut needs_redraw = dirty.swap(false, Ordering::AcqRel);
        needs_redraw |= tui.timer.tick(Utc::now());
        needs_redraw |= toasts.prune(Instant::now());
        needs_redraw |= busy != last_busy;
        needs_redraw |= busy.is_some();

        if needs_redraw {
            let view = DashboardView::build(&state, Utc::now());
            let toast = toasts.latest();
            let overlay = Overlay {
                busy: busy.clone(),
                toast: toast.as_ref(),
                form: tui.form.as_ref(),
                spinner_frame: (start_time.elapsed().as_secs_f32() * 12.0) as usize,
            };
            let screen = &mut tui.screen;
            terminal.draw(|f| ui::draw_ui(f, &view, screen, &overlay))?;
        }
        last_busy = busy;

        // Short polls while busy (spinner) or a toast is up, longer when idle
        let timeout = if last_busy.is_some() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(250)
        };
        let first_event = poll_event_timeout(timeout);
        if first_event.is_some() {
            dirty.store(true, Ordering::Release);
        }

        let mut should_quit = false;
        for event in first_event
            .into_iter()
            .chain(std::iter::from_fn(poll_event_immediate))
        {
            if matches!(event, TuiEvent::Resize) {
                continue;
            }
            if handle_event(event, app, &mut tui) {
                should_quit = true;
                break;
            }
        }
        if should_quit {
            break;
        }
    }

    info!("Shutting down");
    ratatui::restore();
    Ok(())
}

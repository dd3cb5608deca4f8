//! # Dashboard Rendering
//!
//! Draws the [`DashboardView`] and, while drawing, rebuilds the element tree
//! the router resolves clicks against. Every button is an element carrying an
//! action tag (or, for buttons that need input, the form it opens) with a
//! plain label element underneath; mouse hits land on the label and the
//! router walks up to the tagged parent.
//!
//! ```text
//! ┌ Shiftlog ─────────────────────────── driver@example.com ┐
//! │ Shift   ACTIVE 02:14:09  Corolla      [p] Pause [e] End │
//! │ ████████████░░░░░░░░░░░ 22% of target                   │
//! ├ Today ───────────────────┬ Garage ──────────────────────┤
//! │ Daily cost   62 EUR      │ ✕ Corolla [rental] 210 EUR/wk│
//! │ Earnings    110 EUR      ├ Fixed costs ─────────────────┤
//! │ ✕ 09:12 -40 EUR fuel     │ ✕ Insurance 900 EUR/mo       │
//! └──────────────────────────┴──────────────────────────────┘
//!  Expense saved
//! ```

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use serde_json::json;
use unicode_width::UnicodeWidthStr;

use crate::core::action::{Element, ElementId, ElementTree};
use crate::core::model::TxDirection;
use crate::core::notify::{Severity, Toast};
use crate::tui::form::{Form, FormKind, FormState};
use crate::tui::view::{DashboardView, RowView, ShiftPhase, truncate};

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// What a click or hotkey reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    /// An element; resolved through the router.
    Element(ElementId),
    /// A button that opens a form locally.
    Form(FormKind),
}

/// Clickable layout of the last drawn frame.
#[derive(Default)]
pub struct Screen {
    pub elements: ElementTree,
    hits: Vec<(Rect, Hit)>,
    hotkeys: Vec<(char, Hit)>,
}

impl Screen {
    fn clear(&mut self) {
        self.elements.clear();
        self.hits.clear();
        self.hotkeys.clear();
    }

    /// The topmost hit region under the cursor.
    pub fn hit_test(&self, column: u16, row: u16) -> Option<Hit> {
        self.hits
            .iter()
            .rev()
            .find(|(rect, _)| {
                column >= rect.x
                    && column < rect.x + rect.width
                    && row >= rect.y
                    && row < rect.y + rect.height
            })
            .map(|(_, hit)| *hit)
    }

    pub fn hotkey(&self, key: char) -> Option<Hit> {
        self.hotkeys
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, hit)| *hit)
    }

    fn section(&mut self, label: &str) -> ElementId {
        self.elements.push(None, Element::new(label))
    }
}

/// Everything drawn outside the dashboard itself.
pub struct Overlay<'a> {
    pub busy: Option<String>,
    pub toast: Option<&'a Toast>,
    pub form: Option<&'a FormState>,
    pub spinner_frame: usize,
}

enum Target {
    Action(&'static str, Option<String>),
    Form(FormKind),
}

struct Button {
    label: String,
    hotkey: Option<char>,
    target: Target,
}

impl Button {
    fn action(label: &str, hotkey: char, tag: &'static str) -> Self {
        Self {
            label: label.to_string(),
            hotkey: Some(hotkey),
            target: Target::Action(tag, None),
        }
    }

    fn form(label: &str, hotkey: char, kind: FormKind) -> Self {
        Self {
            label: label.to_string(),
            hotkey: Some(hotkey),
            target: Target::Form(kind),
        }
    }

    fn text(&self) -> String {
        match self.hotkey {
            Some(k) => format!("[{}] {}", k, self.label),
            None => self.label.clone(),
        }
    }
}

/// Lays the buttons out left to right and registers them on the screen.
fn button_row(
    frame: &mut Frame,
    area: Rect,
    buttons: Vec<Button>,
    parent: ElementId,
    screen: &mut Screen,
    busy: Option<&str>,
) {
    let mut x = area.x;
    let mut spans = Vec::new();
    for button in buttons {
        let text = button.text();
        let width = (text.width() as u16).min(area.right().saturating_sub(x));
        if width == 0 {
            break;
        }
        let rect = Rect::new(x, area.y, width, 1);
        let (hit, in_flight) = match &button.target {
            Target::Action(tag, payload) => {
                let mut element = Element::new(&button.label).action(*tag);
                element.payload = payload.clone();
                let id = screen.elements.push(Some(parent), element);
                let label = screen.elements.push(Some(id), Element::new(&button.label));
                (Hit::Element(label), busy == Some(*tag))
            }
            Target::Form(kind) => (Hit::Form(*kind), busy == Some(kind.action())),
        };
        screen.hits.push((rect, hit));
        if let Some(k) = button.hotkey {
            screen.hotkeys.push((k, hit));
        }

        let style = if in_flight {
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)
        } else {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        };
        spans.push(Span::styled(text, style));
        spans.push(Span::raw(" "));
        x = x.saturating_add(width + 1);
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draws a list whose rows each start with a delete button.
fn deletable_rows(
    frame: &mut Frame,
    area: Rect,
    rows: &[RowView],
    tag: &'static str,
    parent: ElementId,
    screen: &mut Screen,
    empty: &str,
) {
    if rows.is_empty() {
        frame.render_widget(
            Paragraph::new(empty).style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    }
    let text_width = area.width.saturating_sub(2) as usize;
    let mut lines = Vec::new();
    for (i, row) in rows.iter().enumerate().take(area.height as usize) {
        let y = area.y + i as u16;
        let element = Element::new("✕")
            .action(tag)
            .payload(json!({ "id": row.id }).to_string());
        let id = screen.elements.push(Some(parent), element);
        let label = screen.elements.push(Some(id), Element::new("✕"));
        screen.hits.push((Rect::new(area.x, y, 1, 1), Hit::Element(label)));
        lines.push(Line::from(vec![
            Span::styled("✕", Style::default().fg(Color::Red)),
            Span::raw(" "),
            Span::raw(truncate(&row.text, text_width)),
        ]));
    }
    frame.render_widget(Paragraph::new(lines), area);
}

fn shift_buttons(phase: ShiftPhase) -> Vec<Button> {
    match phase {
        ShiftPhase::Idle => vec![Button::form("Start", 's', FormKind::StartShift)],
        ShiftPhase::Active => vec![
            Button::action("Pause", 'p', "shifts:pause"),
            Button::form("End", 'e', FormKind::EndShift),
        ],
        ShiftPhase::Paused => vec![
            Button::action("Resume", 'r', "shifts:resume"),
            Button::form("End", 'e', FormKind::EndShift),
        ],
    }
}

pub fn draw_ui(frame: &mut Frame, view: &DashboardView, screen: &mut Screen, overlay: &Overlay) {
    use Constraint::{Length, Min};
    screen.clear();
    let busy = overlay.busy.as_deref();

    let [header_area, shift_area, body_area, footer_area] =
        Layout::vertical([Length(1), Length(5), Min(0), Length(1)]).areas(frame.area());

    draw_header(frame, header_area, view, screen, overlay);
    draw_shift(frame, shift_area, view, screen, busy);

    let [today_area, side_area] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(body_area);
    draw_today(frame, today_area, view, screen, busy);
    let [garage_area, costs_area] =
        Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(side_area);
    draw_garage(frame, garage_area, view, screen, busy);
    draw_costs(frame, costs_area, view, screen, busy);

    draw_footer(frame, footer_area, overlay);

    if let Some(form) = overlay.form {
        Form::new(form, busy.is_some()).render(frame, frame.area());
    }
}

fn draw_header(
    frame: &mut Frame,
    area: Rect,
    view: &DashboardView,
    screen: &mut Screen,
    overlay: &Overlay,
) {
    let section = screen.section("header");
    let user = view.user.as_deref().unwrap_or("not signed in");
    let status = match &overlay.busy {
        Some(tag) => format!(" {} {}", SPINNER[overlay.spinner_frame % SPINNER.len()], tag),
        None => String::new(),
    };
    let title = format!("Shiftlog · {user}{status}");
    let buttons = vec![
        Button {
            label: "Refresh".into(),
            hotkey: Some('u'),
            target: Target::Action("app:refresh", None),
        },
        Button::form("Settings", ',', FormKind::Settings),
    ];
    let buttons_width: u16 = buttons.iter().map(|b| b.text().width() as u16 + 1).sum();
    let [title_area, buttons_area] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(buttons_width)]).areas(area);
    frame.render_widget(
        Paragraph::new(Span::styled(title, Style::default().add_modifier(Modifier::BOLD))),
        title_area,
    );
    button_row(frame, buttons_area, buttons, section, screen, overlay.busy.as_deref());
}

fn draw_shift(frame: &mut Frame, area: Rect, view: &DashboardView, screen: &mut Screen, busy: Option<&str>) {
    let section = screen.section("shift");
    let block = Block::default().borders(Borders::ALL).title(" Shift ");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let [status_area, gauge_area, buttons_area] =
        Layout::vertical([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)]).areas(inner);

    let (label, color) = match view.shift.phase {
        ShiftPhase::Idle => ("OFF", Color::DarkGray),
        ShiftPhase::Active => ("ACTIVE", Color::Green),
        ShiftPhase::Paused => ("PAUSED", Color::Yellow),
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(format!("{label:<7}"), Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::raw(format!("{}  ", view.shift.elapsed)),
            Span::styled(view.shift.vehicle.clone(), Style::default().fg(Color::Gray)),
        ])),
        status_area,
    );
    frame.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(color))
            .percent(view.shift.target_percent)
            .label(format!("{}% of target", view.shift.target_percent)),
        gauge_area,
    );
    button_row(frame, buttons_area, shift_buttons(view.shift.phase), section, screen, busy);
}

fn draw_today(frame: &mut Frame, area: Rect, view: &DashboardView, screen: &mut Screen, busy: Option<&str>) {
    let section = screen.section("today");
    let block = Block::default().borders(Borders::ALL).title(" Today ");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let [numbers_area, rental_area, buttons_area, list_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    let goal = view
        .income_goal
        .as_deref()
        .map(|g| format!("goal {g}"))
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(format!("Daily cost  {}", view.daily_cost)),
            Line::from(vec![
                Span::raw("Earnings    "),
                Span::styled(view.shift_earnings.clone(), Style::default().fg(Color::Green)),
                Span::styled(format!("  {goal}"), Style::default().fg(Color::DarkGray)),
            ]),
            Line::from(if view.loading { "Saving..." } else { "" })
                .style(Style::default().fg(Color::DarkGray)),
        ]),
        numbers_area,
    );

    match &view.rental {
        Some(rental) => frame.render_widget(
            Gauge::default()
                .gauge_style(Style::default().fg(Color::Magenta))
                .percent(rental.percent)
                .label(rental.label.clone()),
            rental_area,
        ),
        None => frame.render_widget(
            Paragraph::new("No rental this week").style(Style::default().fg(Color::DarkGray)),
            rental_area,
        ),
    }

    let toggled = view.direction.toggled();
    let direction_label = match view.direction {
        TxDirection::Income => "Mode: income",
        TxDirection::Expense => "Mode: expense",
    };
    let buttons = vec![
        Button {
            label: direction_label.into(),
            hotkey: Some('d'),
            target: Target::Action("finance:direction", Some(toggled.as_str().to_string())),
        },
        Button::form("Expense", 'x', FormKind::Expense),
    ];
    button_row(frame, buttons_area, buttons, section, screen, busy);
    deletable_rows(
        frame,
        list_area,
        &view.transactions,
        "finance:delete",
        section,
        screen,
        "No transactions this shift",
    );
}

fn draw_garage(frame: &mut Frame, area: Rect, view: &DashboardView, screen: &mut Screen, busy: Option<&str>) {
    let section = screen.section("garage");
    let block = Block::default().borders(Borders::ALL).title(" Garage ");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let [buttons_area, list_area] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);
    button_row(
        frame,
        buttons_area,
        vec![Button::form("Add vehicle", 'v', FormKind::AddVehicle)],
        section,
        screen,
        busy,
    );
    deletable_rows(frame, list_area, &view.fleet, "garage:delete", section, screen, "No vehicles");
}

fn draw_costs(frame: &mut Frame, area: Rect, view: &DashboardView, screen: &mut Screen, busy: Option<&str>) {
    let section = screen.section("costs");
    let block = Block::default().borders(Borders::ALL).title(" Fixed costs ");
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let [buttons_area, list_area] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);
    button_row(
        frame,
        buttons_area,
        vec![Button::form("Add cost", 'c', FormKind::AddCost)],
        section,
        screen,
        busy,
    );
    deletable_rows(
        frame,
        list_area,
        &view.fixed_costs,
        "costs:delete",
        section,
        screen,
        "No fixed costs",
    );
}

fn draw_footer(frame: &mut Frame, area: Rect, overlay: &Overlay) {
    let line = match overlay.toast {
        Some(toast) => {
            let color = match toast.severity {
                Severity::Info => Color::Blue,
                Severity::Success => Color::Green,
                Severity::Error => Color::Red,
            };
            Line::from(Span::styled(
                format!(" {}", toast.message),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
        }
        None => Line::from(Span::styled(
            " Click a button or press its key · F5 refresh · q quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

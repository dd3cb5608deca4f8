//! # Form Overlay
//!
//! Small text forms for the actions that need input (start/end shift, add an
//! expense, a vehicle, a fixed cost, edit settings). A form never calls a
//! module itself: submitting yields the action tag and a JSON payload, and
//! the event loop sends them through the router like any other click.
//!
//! Follows the persistent state + transient wrapper pattern:
//! - `FormState` lives in `TuiState` while the overlay is open
//! - `Form` is created each frame with borrowed state

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph};
use serde_json::{Map, Value};

use crate::core::model::Settings;
use crate::tui::event::TuiEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    StartShift,
    EndShift,
    Expense,
    AddVehicle,
    AddCost,
    Settings,
}

impl FormKind {
    pub fn title(self) -> &'static str {
        match self {
            FormKind::StartShift => " Start shift ",
            FormKind::EndShift => " End shift ",
            FormKind::Expense => " Add expense ",
            FormKind::AddVehicle => " Add vehicle ",
            FormKind::AddCost => " Add fixed cost ",
            FormKind::Settings => " Settings ",
        }
    }

    /// The action the form submits to.
    pub fn action(self) -> &'static str {
        match self {
            FormKind::StartShift => "shifts:start",
            FormKind::EndShift => "shifts:end",
            FormKind::Expense => "finance:submit",
            FormKind::AddVehicle => "garage:add",
            FormKind::AddCost => "costs:add",
            FormKind::Settings => "settings:update",
        }
    }

    /// `(payload key, label)` per field.
    fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            FormKind::StartShift => &[("odometer", "Odometer")],
            FormKind::EndShift => &[("income", "Income"), ("odometer", "Odometer")],
            FormKind::Expense => &[
                ("kind", "Kind (fuel, wash, toll...)"),
                ("amount", "Amount"),
                ("volume", "Volume (fuel)"),
                ("odometer", "Odometer (fuel)"),
                ("note", "Note"),
            ],
            FormKind::AddVehicle => &[
                ("name", "Name"),
                ("type", "Type (owned, rental...)"),
                ("weekly_cost", "Weekly cost"),
                ("monthly_wash_cost", "Monthly wash cost"),
            ],
            FormKind::AddCost => &[("name", "Name"), ("monthly_amount", "Monthly amount")],
            FormKind::Settings => &[
                ("currency", "Currency"),
                ("timezone", "Timezone"),
                ("week_start_day", "Week starts (1=Mon..7=Sun)"),
                ("shift_target_hours", "Shift target hours"),
                ("daily_income_goal", "Daily income goal"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
}

/// Events emitted by the form overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    Submit { action: &'static str, payload: String },
    Dismiss,
}

/// Persistent state for an open form.
#[derive(Debug, Clone)]
pub struct FormState {
    pub kind: FormKind,
    pub fields: Vec<FormField>,
    pub focused: usize,
}

impl FormState {
    pub fn new(kind: FormKind) -> Self {
        Self {
            kind,
            fields: kind
                .fields()
                .iter()
                .map(|&(key, label)| FormField {
                    key,
                    label,
                    value: String::new(),
                })
                .collect(),
            focused: 0,
        }
    }

    /// Settings form prefilled with the current values.
    pub fn settings(current: Option<&Settings>) -> Self {
        let mut form = Self::new(FormKind::Settings);
        if let Some(s) = current {
            for field in &mut form.fields {
                field.value = match field.key {
                    "currency" => s.currency.clone(),
                    "timezone" => s.timezone.clone(),
                    "week_start_day" => s.week_start_day.to_string(),
                    "shift_target_hours" => s.shift_target_hours.to_string(),
                    "daily_income_goal" => s.daily_income_goal.to_string(),
                    _ => String::new(),
                };
            }
        }
        form
    }

    /// Non-empty fields as a JSON object. Values stay strings; the modules
    /// accept numeric strings.
    pub fn payload(&self) -> String {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .filter(|f| !f.value.trim().is_empty())
            .map(|f| (f.key.to_string(), Value::from(f.value.trim())))
            .collect();
        Value::Object(map).to_string()
    }

    pub fn handle_event(&mut self, event: &TuiEvent) -> Option<FormEvent> {
        match event {
            TuiEvent::Escape => Some(FormEvent::Dismiss),
            TuiEvent::Submit => Some(FormEvent::Submit {
                action: self.kind.action(),
                payload: self.payload(),
            }),
            TuiEvent::NextField | TuiEvent::CursorDown => {
                self.focused = (self.focused + 1) % self.fields.len().max(1);
                None
            }
            TuiEvent::PrevField | TuiEvent::CursorUp => {
                let len = self.fields.len().max(1);
                self.focused = (self.focused + len - 1) % len;
                None
            }
            TuiEvent::InputChar(c) => {
                if let Some(field) = self.fields.get_mut(self.focused) {
                    field.value.push(*c);
                }
                None
            }
            TuiEvent::Backspace => {
                if let Some(field) = self.fields.get_mut(self.focused) {
                    field.value.pop();
                }
                None
            }
            _ => None,
        }
    }
}

/// Transient render wrapper for the form overlay.
pub struct Form<'a> {
    state: &'a FormState,
    busy: bool,
}

impl<'a> Form<'a> {
    pub fn new(state: &'a FormState, busy: bool) -> Self {
        Self { state, busy }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let height = (self.state.fields.len() as u16) * 2 + 4;
        let overlay = centered_rect(60, height, area);
        frame.render_widget(Clear, overlay);

        let help_text = if self.busy {
            " Working... "
        } else {
            " Enter Save  Tab Next  Esc Cancel "
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(self.state.kind.title())
            .title_alignment(Alignment::Left)
            .title_bottom(Line::from(help_text).centered())
            .padding(Padding::new(1, 1, 1, 0));

        let mut lines = Vec::new();
        for (i, field) in self.state.fields.iter().enumerate() {
            let focused = i == self.state.focused;
            let label_style = if focused {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            lines.push(Line::from(Span::styled(field.label, label_style)));
            let cursor = if focused { "▏" } else { "" };
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(format!("{}{}", field.value, cursor), Style::default().fg(Color::White)),
            ]));
        }
        frame.render_widget(Paragraph::new(lines).block(block), overlay);
    }
}

/// A rect `percent_x` wide and `height` rows tall, centered in `outer`.
fn centered_rect(percent_x: u16, height: u16, outer: Rect) -> Rect {
    let [_, center_v, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height.min(outer.height)),
        Constraint::Fill(1),
    ])
    .areas(outer);
    let [_, center, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(center_v);
    center
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(form: &mut FormState, text: &str) {
        for c in text.chars() {
            form.handle_event(&TuiEvent::InputChar(c));
        }
    }

    #[test]
    fn test_expense_form_builds_payload() {
        let mut form = FormState::new(FormKind::Expense);
        type_text(&mut form, "fuel");
        form.handle_event(&TuiEvent::NextField);
        type_text(&mut form, "52.4");
        form.handle_event(&TuiEvent::NextField);
        type_text(&mut form, "31x");
        form.handle_event(&TuiEvent::Backspace);

        let event = form.handle_event(&TuiEvent::Submit).unwrap();
        let FormEvent::Submit { action, payload } = event else {
            panic!("expected submit");
        };
        assert_eq!(action, "finance:submit");
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"kind": "fuel", "amount": "52.4", "volume": "31"})
        );
    }

    #[test]
    fn test_focus_wraps() {
        let mut form = FormState::new(FormKind::EndShift);
        form.handle_event(&TuiEvent::PrevField);
        assert_eq!(form.focused, 1);
        form.handle_event(&TuiEvent::NextField);
        assert_eq!(form.focused, 0);
    }

    #[test]
    fn test_escape_dismisses() {
        let mut form = FormState::new(FormKind::AddCost);
        assert_eq!(form.handle_event(&TuiEvent::Escape), Some(FormEvent::Dismiss));
    }

    #[test]
    fn test_settings_form_prefilled() {
        let form = FormState::settings(Some(&Settings::defaults_for("u1")));
        assert_eq!(form.fields[0].value, "EUR");
        assert_eq!(form.fields[2].value, "1");
        let value: Value = serde_json::from_str(&form.payload()).unwrap();
        assert_eq!(value["shift_target_hours"], "10");
    }

    #[test]
    fn test_empty_form_payload_is_empty_object() {
        assert_eq!(FormState::new(FormKind::StartShift).payload(), "{}");
    }
}

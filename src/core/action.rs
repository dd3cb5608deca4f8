//! # Action Tags
//!
//! Everything clickable in ShiftLog declares what it does with an action tag:
//! a `"namespace:method"` string, optionally with a serialized payload.
//! The "Start shift" button carries `shifts:start`, a vehicle's delete
//! button carries `garage:delete` plus `{"id": "..."}`.
//!
//! The UI never calls business logic directly. It builds an [`ElementTree`]
//! of tagged elements, and the router reads the tags when a click lands.
//!
//! ```text
//! ElementTree
//! ├── panel            (no tag)
//! │   └── button       action="shifts:start"  payload='{"odometer":1200}'
//! │       └── label    (no tag)  ← click lands here, router walks up
//! └── ...
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A parsed `"namespace:method"` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionTag {
    pub namespace: String,
    pub method: String,
}

impl ActionTag {
    pub fn new(namespace: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseTagError {
    /// The tag has no `:` separator (e.g. `"garage"`).
    MissingColon(String),
}

impl fmt::Display for ParseTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseTagError::MissingColon(raw) => {
                write!(f, "malformed action tag '{raw}': expected namespace:method")
            }
        }
    }
}

impl std::error::Error for ParseTagError {}

impl FromStr for ActionTag {
    type Err = ParseTagError;

    /// Splits on the first colon only: `"a:b:c"` is namespace `a`, method `b:c`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.split_once(':')
            .map(|(namespace, method)| ActionTag::new(namespace, method))
            .ok_or_else(|| ParseTagError::MissingColon(raw.to_string()))
    }
}

// ============================================================================
// Payload
// ============================================================================

/// The decoded payload attribute of an element.
///
/// JSON when the raw text parses as JSON, otherwise the raw text itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Json(Value),
    Raw(String),
}

impl Payload {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Payload::None,
            Some(text) => match serde_json::from_str::<Value>(text) {
                Ok(value) => Payload::Json(value),
                Err(_) => Payload::Raw(text.to_string()),
            },
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// The payload as plain text: raw payloads and JSON strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Raw(text) => Some(text),
            Payload::Json(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// The payload as a JSON object, if it is one.
    pub fn as_object(&self) -> Option<&serde_json::Map<String, Value>> {
        match self {
            Payload::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// A non-empty, trimmed string field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        match self.field(key)? {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        }
    }

    /// A finite numeric field. Form inputs arrive as text, so numeric
    /// strings count; `inf` and `NaN` do not.
    pub fn number_field(&self, key: &str) -> Option<f64> {
        parse_number(self.field(key)?)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let value = match self {
            Payload::None => Value::Null,
            Payload::Json(value) => value.clone(),
            Payload::Raw(text) => Value::String(text.clone()),
        };
        serde_json::from_value(value)
    }
}

/// A JSON number, or a string holding one. Non-finite values are rejected
/// since they cannot be stored as JSON.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

// ============================================================================
// Elements
// ============================================================================

/// Index of an element inside its [`ElementTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

/// A declarative UI element. The router only ever reads `action` and `payload`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub label: String,
    pub action: Option<String>,
    pub payload: Option<String>,
}

impl Element {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn action(mut self, tag: impl Into<String>) -> Self {
        self.action = Some(tag.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

struct Node {
    element: Element,
    parent: Option<ElementId>,
}

/// Arena of elements with parent links. Rebuilt by the UI every frame.
#[derive(Default)]
pub struct ElementTree {
    nodes: Vec<Node>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, parent: Option<ElementId>, element: Element) -> ElementId {
        let id = ElementId(self.nodes.len());
        self.nodes.push(Node { element, parent });
        id
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.nodes.get(id.0).map(|node| &node.element)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// Walks from `id` up through its ancestors (inclusive) and returns the
    /// first element that carries an action tag.
    pub fn closest_action(&self, id: ElementId) -> Option<(ElementId, &Element)> {
        let mut current = Some(id);
        while let Some(cursor) = current {
            let element = self.get(cursor)?;
            if element.action.is_some() {
                return Some((cursor, element));
            }
            current = self.parent(cursor);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// A click delivered to an element.
#[derive(Debug)]
pub struct ClickEvent {
    pub target: ElementId,
    default_prevented: bool,
}

impl ClickEvent {
    pub fn new(target: ElementId) -> Self {
        Self {
            target,
            default_prevented: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

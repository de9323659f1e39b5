//! MPV JSON IPC protocol types.
//!
//! Reference: https://mpv.io/manual/master/#json-ipc

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker mpv puts in the `error` field of a successful response.
pub const SUCCESS: &str = "success";

/// Error string mpv returns when a property has no value (e.g. nothing loaded).
pub const PROPERTY_UNAVAILABLE: &str = "property unavailable";

/// Command sent to MPV via IPC: `{"command": [method, args...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpvCommand {
  pub command: Vec<Value>,
}

impl MpvCommand {
  pub fn new(args: Vec<Value>) -> Self {
    Self { command: args }
  }

  /// Method name (first element), if any.
  pub fn method(&self) -> Option<&str> {
    self.command.first().and_then(Value::as_str)
  }

  /// Replace the current file with a new one.
  pub fn loadfile(url: &str) -> Self {
    Self::new(vec!["loadfile".into(), url.into(), "replace".into()])
  }

  /// Seek to absolute position in seconds.
  pub fn seek(time: f64) -> Self {
    Self::new(vec!["seek".into(), time.into(), "absolute".into()])
  }

  /// Observe a property for changes.
  pub fn observe_property(id: i64, name: &str) -> Self {
    Self::new(vec!["observe_property".into(), id.into(), name.into()])
  }

  /// Get a property value.
  pub fn get_property(name: &str) -> Self {
    Self::new(vec!["get_property".into(), name.into()])
  }

  /// Set a property to an arbitrary JSON value.
  pub fn set_property(name: &str, value: impl Into<Value>) -> Self {
    Self::new(vec!["set_property".into(), name.into(), value.into()])
  }

  /// Replace the chapter list shown on the player timeline.
  pub fn set_chapters(chapters: &[Chapter]) -> Self {
    let list = chapters
      .iter()
      .map(|c| serde_json::json!({ "title": c.title, "time": c.time }))
      .collect::<Vec<_>>();
    Self::set_property("chapter-list", Value::Array(list))
  }

  /// Quit MPV.
  pub fn quit() -> Self {
    Self::new(vec!["quit".into()])
  }

  /// Serialize as a single newline-terminated line.
  pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(self)?;
    line.push(b'\n');
    Ok(line)
  }
}

/// Response from MPV for a command.
#[derive(Debug, Clone, Deserialize)]
pub struct MpvResponse {
  /// "success" or error message.
  #[serde(default)]
  pub error: String,
  /// Response data (command-specific).
  #[serde(default)]
  pub data: Value,
}

impl MpvResponse {
  /// Check if the command succeeded. An empty error string counts as success.
  pub fn is_success(&self) -> bool {
    self.error.is_empty() || self.error == SUCCESS
  }
}

/// Event sent by MPV (property changes, playback events, etc.).
#[derive(Debug, Clone, Deserialize)]
pub struct MpvEvent {
  /// Event type (e.g., "property-change", "end-file", "idle").
  pub event: String,
  /// Observer ID for property-change events.
  pub id: Option<i64>,
  /// Property name for property-change events.
  pub name: Option<String>,
  /// Event data.
  pub data: Option<Value>,
  /// Reason for end-file events (e.g., "eof", "stop", "quit", "error").
  pub reason: Option<String>,
}

impl MpvEvent {
  pub fn is_property_change(&self) -> bool {
    self.event == "property-change"
  }
}

/// Message received from MPV IPC (either response or event).
#[derive(Debug, Clone)]
pub enum MpvMessage {
  Response(MpvResponse),
  Event(MpvEvent, Value),
}

impl MpvMessage {
  /// Parse a JSON line from MPV.
  ///
  /// Events carry an `"event"` field, responses an `"error"` field.
  pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
    let raw: Value = serde_json::from_str(line)?;
    if raw.get("event").is_some() {
      let event = MpvEvent::deserialize(&raw)?;
      Ok(MpvMessage::Event(event, raw))
    } else {
      let response = MpvResponse::deserialize(&raw)?;
      Ok(MpvMessage::Response(response))
    }
  }
}

/// Typed view over a property value returned by MPV.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
  Bool(bool),
  Number(f64),
  String(String),
  /// Arrays and objects, kept as raw JSON.
  Json(Value),
  Null,
}

impl PropertyValue {
  /// Short name of the variant, used in type mismatch errors.
  pub fn kind(&self) -> &'static str {
    match self {
      PropertyValue::Bool(_) => "bool",
      PropertyValue::Number(_) => "number",
      PropertyValue::String(_) => "string",
      PropertyValue::Json(_) => "json",
      PropertyValue::Null => "null",
    }
  }
}

impl From<Value> for PropertyValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Bool(b) => PropertyValue::Bool(b),
      Value::Number(n) => n.as_f64().map(PropertyValue::Number).unwrap_or(PropertyValue::Null),
      Value::String(s) => PropertyValue::String(s),
      Value::Array(_) | Value::Object(_) => PropertyValue::Json(value),
      Value::Null => PropertyValue::Null,
    }
  }
}

/// Timeline marker pushed to the player's `chapter-list` property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chapter {
  pub title: String,
  pub time: f64,
}

impl Chapter {
  pub fn new(title: impl Into<String>, time: f64) -> Self {
    Self {
      title: title.into(),
      time,
    }
  }
}

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Field names reported first, in form order.
const FORM_FIELD_ORDER: [&str; 3] = ["username", "email", "password"];
/// Keys carrying form-wide messages rather than a single field's.
const GENERAL_KEYS: [&str; 3] = ["error", "non_field_errors", "detail"];

/// Classified backend failure.
///
/// Transports map every failure into exactly one of these; callers never see
/// raw transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Rejected input with per-field messages, recoverable by resubmission.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    /// The credential was rejected (`401`).
    #[error("credential rejected: {message}")]
    Unauthorized { message: String },
    /// Transient failure: unreachable backend, timeout, unexpected status or body.
    #[error("{}", network_display(.status, .message))]
    Network { status: Option<u16>, message: String },
}

impl BackendError {
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

fn network_display(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("network failure (HTTP {status}): {message}"),
        None => format!("network failure: {message}"),
    }
}

/// Classify a non-success HTTP response.
///
/// `401` is the sole authorization signal. `400`/`422` bodies that parse as a
/// field map become [`BackendError::Validation`]; everything else is transient.
#[must_use]
pub fn classify_status(status: u16, body: &str) -> BackendError {
    match status {
        401 => BackendError::Unauthorized {
            message: detail_message(body).unwrap_or_else(|| "authentication required".to_owned()),
        },
        400 | 422 => match FieldErrors::from_body(body) {
            Some(errors) if !errors.is_empty() => BackendError::Validation(errors),
            _ => BackendError::Network {
                status: Some(status),
                message: fallback_message(body),
            },
        },
        _ => BackendError::Network {
            status: Some(status),
            message: fallback_message(body),
        },
    }
}

fn detail_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn fallback_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "request failed".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Per-field validation messages, verbatim from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Parse a JSON object whose values are a message string or a list of them.
    ///
    /// Returns `None` when the body is not a JSON object.
    #[must_use]
    pub fn from_body(body: &str) -> Option<Self> {
        let Value::Object(map) = serde_json::from_str::<Value>(body).ok()? else {
            return None;
        };

        let mut errors = Self::new();
        for (field, value) in map {
            match value {
                Value::String(message) => errors.push(field, message),
                Value::Array(items) => {
                    for item in items {
                        match item {
                            Value::String(message) => errors.push(field.clone(), message),
                            other => errors.push(field.clone(), other.to_string()),
                        }
                    }
                }
                Value::Null => {}
                other => errors.push(field, other.to_string()),
            }
        }
        Some(errors)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages reported for `field`; empty when there are none.
    #[must_use]
    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// All messages joined with spaces: form fields first, then any other
    /// field alphabetically, then form-wide messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let form_fields = FORM_FIELD_ORDER.iter().copied();
        let other_fields = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|key| !FORM_FIELD_ORDER.contains(key) && !GENERAL_KEYS.contains(key));
        let general = GENERAL_KEYS.iter().copied();

        form_fields
            .chain(other_fields)
            .chain(general)
            .flat_map(|key| self.field(key).iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

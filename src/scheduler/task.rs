//! Task and outcome definitions for the scheduler.
//!
//! This module defines the units flowing through a batch:
//!
//! - `Task`: a caller-identified payload plus an optional override patch
//! - `Outcome`: the terminal success/failure result recorded for a task

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TaskError;

/// A single dispatchable unit of work.
///
/// Tasks are immutable once queued; the executor merges `overrides` into
/// `payload` before the first attempt and reuses the merged payload for
/// every retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Caller-assigned identifier, unique within one batch.
    pub id: String,
    /// Opaque structured input for the compute operation.
    pub payload: Value,
    /// Optional partial payload patch applied before execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,
}

impl Task {
    /// Creates a new task without overrides.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            overrides: None,
        }
    }

    /// Sets the override patch.
    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Returns the payload with overrides applied.
    pub fn merged_payload(&self) -> Value {
        match &self.overrides {
            Some(overrides) => merge_overrides(&self.payload, overrides),
            None => self.payload.clone(),
        }
    }
}

/// Applies an override patch onto a payload.
///
/// Top-level override keys replace payload keys. When both sides hold an
/// object under the same key, the inner keys are merged one level deep
/// (override wins) instead of replacing the whole object, so that patching
/// a single equipment slot keeps the others. A `null` patch is a no-op and a
/// non-object payload is replaced by an object patch.
pub fn merge_overrides(payload: &Value, overrides: &Value) -> Value {
    let patch = match overrides {
        Value::Null => return payload.clone(),
        Value::Object(patch) => patch,
        other => return other.clone(),
    };

    let mut merged = match payload {
        Value::Object(base) => base.clone(),
        _ => Map::new(),
    };

    for (key, value) in patch {
        match (merged.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(inner)) => {
                for (inner_key, inner_value) in inner {
                    existing.insert(inner_key.clone(), inner_value.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(merged)
}

/// Terminal result of executing one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    /// Whether the task produced a result.
    pub success: bool,
    /// Structured numeric result of the compute operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    /// Error message of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    /// Creates a successful outcome.
    pub fn success(metrics: Value) -> Self {
        Self {
            success: true,
            metrics: Some(metrics),
            error: None,
        }
    }

    /// Creates a failed outcome with the given message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            metrics: None,
            error: Some(error.into()),
        }
    }

    /// Creates a failed outcome from the error of the last attempt.
    pub fn from_error(error: &TaskError) -> Self {
        Self::failure(error.to_string())
    }
}

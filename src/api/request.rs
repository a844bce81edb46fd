//! Inbound request decoding.
//!
//! A simulation request is either a batch (`{"simulations": [...]}`) or a
//! single simulation (`{"character": {...}}`). The shape is decided once here
//! and never re-inspected downstream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dispatch::{BatchResponse, DispatchController};
use crate::error::{DispatchError, RequestError};
use crate::scheduler::{Outcome, Task};

/// Task id used for single-simulation requests.
pub const SINGLE_TASK_ID: &str = "single";

/// Payload key under which equipment overrides are merged.
const EQUIPMENT_KEY: &str = "equipment";
/// Payload key carrying the raw character export.
const RAW_CHARACTER_KEY: &str = "rawCharacterData";

/// One entry of a batch request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub id: String,
    pub character: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_override: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_character_data: Option<Value>,
}

impl SimulationRequest {
    /// Converts the entry into a dispatchable task.
    pub fn into_task(self) -> Task {
        build_task(
            self.id,
            self.character,
            self.equipment_override,
            self.raw_character_data,
        )
    }
}

/// A single-simulation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleSimulation {
    pub character: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment_override: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_character_data: Option<Value>,
}

impl SingleSimulation {
    /// Converts the request into a task with id [`SINGLE_TASK_ID`].
    pub fn into_task(self) -> Task {
        build_task(
            SINGLE_TASK_ID.to_string(),
            self.character,
            self.equipment_override,
            self.raw_character_data,
        )
    }
}

#[derive(Deserialize)]
struct BatchBody {
    simulations: Vec<SimulationRequest>,
}

/// Decoded simulation request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchRequest {
    Batch(Vec<SimulationRequest>),
    Single(SingleSimulation),
}

impl DispatchRequest {
    /// Decodes a request from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidJson` if the body is not JSON, and the
    /// errors of [`DispatchRequest::from_value`] otherwise.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    /// Decodes a request from a parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::NotAnObject` for non-object bodies and
    /// `RequestError::Malformed` when the body matches neither shape.
    pub fn from_value(value: Value) -> Result<Self, RequestError> {
        let Some(body) = value.as_object() else {
            return Err(RequestError::NotAnObject);
        };

        if body.contains_key("simulations") {
            if !body["simulations"].is_array() {
                return Err(RequestError::Malformed(
                    "`simulations` must be an array".to_string(),
                ));
            }
            let batch: BatchBody = serde_json::from_value(value)
                .map_err(|e| RequestError::Malformed(e.to_string()))?;
            Ok(DispatchRequest::Batch(batch.simulations))
        } else if body.contains_key("character") {
            let single: SingleSimulation = serde_json::from_value(value)
                .map_err(|e| RequestError::Malformed(e.to_string()))?;
            Ok(DispatchRequest::Single(single))
        } else {
            Err(RequestError::Malformed(
                "expected either `simulations` or `character`".to_string(),
            ))
        }
    }

    /// Number of tasks the request will dispatch.
    pub fn task_count(&self) -> usize {
        match self {
            DispatchRequest::Batch(simulations) => simulations.len(),
            DispatchRequest::Single(_) => 1,
        }
    }

    /// Returns true for batch requests.
    pub fn is_batch(&self) -> bool {
        matches!(self, DispatchRequest::Batch(_))
    }

    /// Dispatches the request on `controller`.
    ///
    /// Batches reply with a [`BatchResponse`], single simulations with the
    /// bare [`Outcome`]. A fatal batch still carries a reply in that shape.
    pub async fn dispatch(self, controller: &DispatchController) -> Dispatched {
        match self {
            DispatchRequest::Batch(simulations) => {
                let tasks = simulations
                    .into_iter()
                    .map(SimulationRequest::into_task)
                    .collect();
                match controller.dispatch_batch(tasks).await {
                    Ok(response) => Dispatched {
                        reply: DispatchReply::Batch(response),
                        fatal: None,
                    },
                    Err(failure) => Dispatched {
                        reply: DispatchReply::Batch(failure.response),
                        fatal: Some(failure.error),
                    },
                }
            }
            DispatchRequest::Single(single) => {
                match controller.dispatch_single(single.into_task()).await {
                    Ok(outcome) => Dispatched {
                        reply: DispatchReply::Single(outcome),
                        fatal: None,
                    },
                    Err(failure) => Dispatched {
                        reply: DispatchReply::Single(failure.outcome_for(SINGLE_TASK_ID)),
                        fatal: Some(failure.error),
                    },
                }
            }
        }
    }
}

/// Reply body, shaped after the request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DispatchReply {
    Batch(BatchResponse),
    Single(Outcome),
}

/// A dispatched request.
#[derive(Debug)]
pub struct Dispatched {
    pub reply: DispatchReply,
    /// Error that aborted the batch as a whole, if any.
    pub fatal: Option<DispatchError>,
}

fn build_task(
    id: String,
    character: Value,
    equipment_override: Option<Value>,
    raw_character_data: Option<Value>,
) -> Task {
    let mut payload = character;
    if let (Some(raw), Value::Object(fields)) = (raw_character_data, &mut payload) {
        fields.insert(RAW_CHARACTER_KEY.to_string(), raw);
    }

    let task = Task::new(id, payload);
    match equipment_override {
        Some(Value::Null) | None => task,
        Some(equipment) => {
            let mut overrides = Map::new();
            overrides.insert(EQUIPMENT_KEY.to_string(), equipment);
            task.with_overrides(Value::Object(overrides))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{MockSimulation, MockSimulationConfig};
    use crate::dispatch::DispatchConfig;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn batch_tasks(request: DispatchRequest) -> Vec<Task> {
        match request {
            DispatchRequest::Batch(simulations) => simulations
                .into_iter()
                .map(SimulationRequest::into_task)
                .collect(),
            DispatchRequest::Single(_) => panic!("expected a batch"),
        }
    }

    #[test]
    fn test_decode_batch() {
        let request = DispatchRequest::from_slice(
            br#"{"simulations": [
                {"id": "a", "character": {"name": "A"}},
                {"id": "b", "character": {"name": "B"}, "equipmentOverride": {"head": {"ilvl": 610}}}
            ]}"#,
        )
        .unwrap();

        assert!(request.is_batch());
        assert_eq!(request.task_count(), 2);

        let tasks = batch_tasks(request);
        assert_eq!(tasks[0].id, "a");
        assert!(tasks[0].overrides.is_none());
        assert_eq!(
            tasks[1].merged_payload(),
            json!({"name": "B", "equipment": {"head": {"ilvl": 610}}})
        );
    }

    #[test]
    fn test_decode_empty_batch() {
        let request = DispatchRequest::from_value(json!({"simulations": []})).unwrap();
        assert_eq!(request.task_count(), 0);
        assert!(batch_tasks(request).is_empty());
    }

    #[test]
    fn test_decode_single() {
        let request = DispatchRequest::from_value(json!({
            "character": {"name": "Solo", "equipment": {"head": {"ilvl": 600}}},
            "equipmentOverride": {"chest": {"ilvl": 620}},
            "rawCharacterData": "# simc export"
        }))
        .unwrap();

        assert!(!request.is_batch());
        let DispatchRequest::Single(single) = request else {
            panic!("expected a single simulation");
        };
        let task = single.into_task();
        assert_eq!(task.id, SINGLE_TASK_ID);
        assert_eq!(
            task.merged_payload(),
            json!({
                "name": "Solo",
                "rawCharacterData": "# simc export",
                "equipment": {"head": {"ilvl": 600}, "chest": {"ilvl": 620}}
            })
        );
    }

    #[test]
    fn test_simulations_key_wins_over_character() {
        let request = DispatchRequest::from_value(json!({
            "simulations": [{"id": "a", "character": {}}],
            "character": {}
        }))
        .unwrap();
        assert!(request.is_batch());
    }

    #[test]
    fn test_malformed_requests() {
        assert!(matches!(
            DispatchRequest::from_slice(b"not json"),
            Err(RequestError::InvalidJson(_))
        ));
        assert!(matches!(
            DispatchRequest::from_value(json!([1, 2])),
            Err(RequestError::NotAnObject)
        ));
        assert!(matches!(
            DispatchRequest::from_value(json!({"foo": 1})),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            DispatchRequest::from_value(json!({"simulations": {"id": "a"}})),
            Err(RequestError::Malformed(_))
        ));
        // Batch entries need an id.
        assert!(matches!(
            DispatchRequest::from_value(json!({"simulations": [{"character": {}}]})),
            Err(RequestError::Malformed(_))
        ));
    }

    #[test]
    fn test_null_override_is_ignored() {
        let task = SimulationRequest {
            id: "a".to_string(),
            character: json!({"name": "A"}),
            equipment_override: Some(Value::Null),
            raw_character_data: None,
        }
        .into_task();
        assert!(task.overrides.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_replies_in_request_shape() {
        let compute = MockSimulation::new(
            MockSimulationConfig::default()
                .with_latency(Duration::ZERO, Duration::ZERO)
                .with_seed(3),
        );
        let controller =
            DispatchController::new(DispatchConfig::default(), Arc::new(compute)).unwrap();

        let body = json!({"simulations": [{"id": "a", "character": {}}]});
        let batch = DispatchRequest::from_value(body)
            .unwrap()
            .dispatch(&controller)
            .await;
        assert!(batch.fatal.is_none());
        match batch.reply {
            DispatchReply::Batch(response) => assert_eq!(response.summary.successful, 1),
            DispatchReply::Single(_) => panic!("expected a batch reply"),
        }

        let single = DispatchRequest::from_value(json!({"character": {}}))
            .unwrap()
            .dispatch(&controller)
            .await;
        assert!(single.fatal.is_none());
        let body = serde_json::to_value(&single.reply).unwrap();
        assert_eq!(body["success"], true);
        assert!(body.get("summary").is_none());
    }
}

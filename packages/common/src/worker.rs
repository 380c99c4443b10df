use serde::{Deserialize, Serialize};

/// Generic task envelope published to the worker queue.
///
/// The payload is an opaque JSON document; `task_type` selects the handler
/// on the worker side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
}

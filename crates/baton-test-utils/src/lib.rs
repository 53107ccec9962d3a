//! Test doubles for the daemon, signal and registry seams.

mod daemon;
mod registry;
mod sink;

pub use daemon::{ScriptedDaemon, TaskCall};
pub use registry::StaticRegistry;
pub use sink::{FailingSink, RecordingSink};

use baton_core::types::DataMap;

/// Build a `DataMap` from a JSON object literal. Non-object values yield an empty map.
pub fn data(value: serde_json::Value) -> DataMap {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => DataMap::new(),
    }
}

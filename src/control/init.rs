//! `$init` message builder.
//!
//! The `$init` message tells the parent where to connect and which methods
//! the worker serves:
//!
//! ```
//! use edgestream::control::{build_init_message, InitSchema};
//!
//! let json = build_init_message("/tmp/edgestream.sock", &InitSchema::edge_worker()).unwrap();
//! assert!(json.contains(r#""detectEdges":{"id":1,"response":"stream"}"#));
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::protocol::{DETECT_EDGES_METHOD_ID, DETECT_EDGES_METHOD_NAME};

/// Protocol version string.
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// Response type announced for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Returns a single result.
    Result,
    /// Returns a stream of chunks.
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodSchema {
    /// Method ID carried in every frame of the call.
    pub id: u16,
    pub response: ResponseType,
}

/// Methods and events announced to the parent.
///
/// This worker emits no events; the map is kept so the announced shape is
/// the one the parent expects.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InitSchema {
    pub methods: BTreeMap<String, MethodSchema>,
    pub events: BTreeMap<String, MethodSchema>,
}

impl InitSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema of the edge-detection worker.
    pub fn edge_worker() -> Self {
        let mut schema = Self::new();
        schema.add_method(
            DETECT_EDGES_METHOD_NAME,
            DETECT_EDGES_METHOD_ID,
            ResponseType::Stream,
        );
        schema
    }

    pub fn add_method(&mut self, name: &str, id: u16, response: ResponseType) {
        self.methods
            .insert(name.to_string(), MethodSchema { id, response });
    }

    pub fn get_method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.get(name)
    }

    /// Whether `method_id` belongs to an announced method.
    pub fn serves(&self, method_id: u16) -> bool {
        self.methods.values().any(|m| m.id == method_id)
    }
}

#[derive(Serialize)]
struct InitMessage<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: InitParams<'a>,
}

#[derive(Serialize)]
struct InitParams<'a> {
    pipe: &'a str,
    schema: &'a InitSchema,
    version: &'static str,
}

/// Build the `$init` JSON-RPC line for the given pipe path.
pub fn build_init_message(pipe_path: &str, schema: &InitSchema) -> Result<String> {
    let message = InitMessage {
        jsonrpc: "2.0",
        method: "$init",
        params: InitParams {
            pipe: pipe_path,
            schema,
            version: PROTOCOL_VERSION,
        },
    };
    Ok(serde_json::to_string(&message)?)
}

//! Data model and wire envelopes.
//!
//! Contains document references, mutation paths and operations as the hook
//! pipeline sees them, plus the call envelopes shared with the multiplexer.
//! The field-level encoding of individual edits is opaque to the gateway;
//! only the path drives authorization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::roles::META_KEY;

// ==================== Document References ====================

/// Reference to exactly one synchronized document inside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRef {
    pub collection: String,
    pub name: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
        }
    }

    /// Concatenated identifier, `"collection.name"`.
    pub fn document_id(&self) -> String {
        format!("{}.{}", self.collection, self.name)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.collection, self.name)
    }
}

// ==================== Paths ====================

/// One step into a document's JSON-like value tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// Ordered sequence of keys and indices locating a sub-element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathStep>);

impl Path {
    /// The empty path, denoting the whole document.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Convenience constructor for key-only paths.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| PathStep::Key(k.into())).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A path is meta iff it targets the whole document (empty — creation or
    /// deletion) or starts at the reserved structural key. All other paths
    /// are ordinary data paths.
    pub fn is_meta(&self) -> bool {
        match self.0.first() {
            None => true,
            Some(PathStep::Key(key)) => key == META_KEY,
            Some(PathStep::Index(_)) => false,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for step in &self.0 {
            match step {
                PathStep::Key(key) => write!(f, "/{}", key)?,
                PathStep::Index(index) => write!(f, "/{}", index)?,
            }
        }
        Ok(())
    }
}

// ==================== Operations ====================

/// A mutation the engine is about to apply or commit against one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocOperation {
    /// Bring a new document into existence with an initial value.
    Create { value: Value },
    /// Remove the whole document.
    Delete,
    /// A batch of sub-edits against an existing document.
    Edit { edits: Vec<SubEdit> },
}

impl DocOperation {
    /// Create and delete target the whole document rather than sub-paths.
    pub fn is_structural(&self) -> bool {
        matches!(self, DocOperation::Create { .. } | DocOperation::Delete)
    }
}

/// A single sub-edit inside an operation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEdit {
    pub path: Path,
    /// Edit payload beyond the path; carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl SubEdit {
    pub fn at(path: Path) -> Self {
        Self { path, value: None }
    }
}

// ==================== Call Envelopes ====================

/// Client-to-server call envelope.
///
/// The presence of `correlationId` is what distinguishes a call from
/// synchronization traffic; a message without it is never routed to a
/// handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub correlation_id: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallRequest {
    /// Classify an inbound message. `None` means synchronization traffic
    /// that must reach the engine unchanged.
    ///
    /// Any message carrying a `correlationId` is a call, even a malformed
    /// one — a missing method dispatches as unknown rather than leaking the
    /// envelope into the engine's receive handling.
    pub fn from_message(message: &Value) -> Option<CallRequest> {
        let id = message.get("correlationId")?;
        let correlation_id = match id.as_str() {
            Some(s) => s.to_string(),
            None => id.to_string(),
        };
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args = message
            .get("args")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Some(CallRequest {
            correlation_id,
            method,
            args,
        })
    }
}

/// Server-to-client response envelope, paired with its call by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResponse {
    pub fn ok(correlation_id: impl Into<String>, result: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(correlation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

// ==================== Tests ====================

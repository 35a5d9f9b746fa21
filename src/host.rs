//! # Host Value Capability
//!
//! The structured batch path walks values that already live in the host
//! runtime (a JS array, a Python list, a JSON document). This crate never
//! depends on a particular host object model. It only needs to:
//!
//! - ask whether a value is a sequence, and how long it is
//! - fetch an element by position
//! - read a value as text
//! - convert a scalar into a [`Value`]
//!
//! [`HostValue`] is that capability. It is implemented for
//! `serde_json::Value` and for [`HostNode`], a small owned tree that can also
//! carry blobs.

use crate::types::{Operation, Value};

// =============================================================================
// Capability Trait
// =============================================================================

/// Read-only access to a host runtime value.
pub trait HostValue {
    /// Length when the value is a sequence, `None` otherwise.
    fn seq_len(&self) -> Option<usize>;

    /// Element at `index` when the value is a sequence.
    fn element(&self, index: usize) -> Option<&Self>;

    /// The value as text, when it is a string.
    fn as_text(&self) -> Option<&str>;

    /// Converts a scalar into a bind value. `None` for sequences and maps.
    fn to_value(&self) -> Option<Value>;

    /// Short description of the value's kind, for error messages.
    fn kind(&self) -> &'static str;
}

// =============================================================================
// serde_json::Value
// =============================================================================

impl HostValue for serde_json::Value {
    fn seq_len(&self) -> Option<usize> {
        self.as_array().map(Vec::len)
    }

    fn element(&self, index: usize) -> Option<&Self> {
        self.as_array().and_then(|items| items.get(index))
    }

    fn as_text(&self) -> Option<&str> {
        self.as_str()
    }

    fn to_value(&self) -> Option<Value> {
        use serde_json::Value as Json;

        match self {
            Json::Null => Some(Value::Null),
            Json::Bool(b) => Some(Value::from(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Integer(i))
                } else {
                    // u64 beyond i64::MAX, or a fractional number
                    n.as_f64().map(Value::Real)
                }
            }
            Json::String(s) => Some(Value::Text(s.clone())),
            Json::Array(_) | Json::Object(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        use serde_json::Value as Json;

        match self {
            Json::Null => "null",
            Json::Bool(_) => "boolean",
            Json::Number(_) => "number",
            Json::String(_) => "string",
            Json::Array(_) => "array",
            Json::Object(_) => "object",
        }
    }
}

// =============================================================================
// HostNode
// =============================================================================

/// An owned host value tree: scalars and nested lists.
#[derive(Debug, Clone, PartialEq)]
pub enum HostNode {
    Scalar(Value),
    List(Vec<HostNode>),
}

impl HostValue for HostNode {
    fn seq_len(&self) -> Option<usize> {
        match self {
            HostNode::List(items) => Some(items.len()),
            HostNode::Scalar(_) => None,
        }
    }

    fn element(&self, index: usize) -> Option<&Self> {
        match self {
            HostNode::List(items) => items.get(index),
            HostNode::Scalar(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            HostNode::Scalar(v) => v.as_str(),
            HostNode::List(_) => None,
        }
    }

    fn to_value(&self) -> Option<Value> {
        match self {
            HostNode::Scalar(v) => Some(v.clone()),
            HostNode::List(_) => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            HostNode::Scalar(v) => v.type_name(),
            HostNode::List(_) => "list",
        }
    }
}

impl From<Value> for HostNode {
    fn from(value: Value) -> Self {
        HostNode::Scalar(value)
    }
}

impl From<Operation> for HostNode {
    fn from(op: Operation) -> Self {
        let batches = op
            .arg_batches
            .into_iter()
            .map(|args| HostNode::List(args.into_iter().map(HostNode::Scalar).collect()))
            .collect();

        HostNode::List(vec![
            HostNode::Scalar(Value::Integer(op.op_type)),
            HostNode::Scalar(Value::Text(op.table)),
            HostNode::Scalar(Value::Text(op.sql)),
            HostNode::List(batches),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_scalars() {
        assert_eq!(json!(null).to_value(), Some(Value::Null));
        assert_eq!(json!(true).to_value(), Some(Value::Integer(1)));
        assert_eq!(json!(-4).to_value(), Some(Value::Integer(-4)));
        assert_eq!(json!(1.5).to_value(), Some(Value::Real(1.5)));
        assert_eq!(json!(u64::MAX).to_value(), Some(Value::Real(u64::MAX as f64)));
        assert_eq!(json!("x").to_value(), Some(Value::Text("x".into())));
        assert_eq!(json!([1]).to_value(), None);
        assert_eq!(json!({"a": 1}).kind(), "object");
    }

    #[test]
    fn test_json_sequence_access() {
        let op = json!([0, "t", "SELECT 1", []]);
        assert_eq!(op.seq_len(), Some(4));
        assert_eq!(op.element(2).and_then(HostValue::as_text), Some("SELECT 1"));
        assert_eq!(op.element(9), None);
        assert_eq!(json!("x").element(0), None);
    }

    #[test]
    fn test_operation_into_node() {
        let op = Operation::new(2, "t", "INSERT INTO t(b) VALUES (?)", vec![vec![Value::Blob(vec![1, 2])]]);
        let node = HostNode::from(op);

        assert_eq!(node.seq_len(), Some(4));
        assert_eq!(node.element(1).and_then(HostValue::as_text), Some("t"));

        let first_arg = node
            .element(3)
            .and_then(|batches| batches.element(0))
            .and_then(|args| args.element(0))
            .and_then(HostValue::to_value);
        assert_eq!(first_arg, Some(Value::Blob(vec![1, 2])));
    }
}

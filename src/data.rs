//! The wire-independent data model: what an operation asks for, and what
//! comes back, regardless of which subprotocol carried it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

fn default_for_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single location in a GraphQL document an error can be attributed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
}

/// A GraphQL-shaped error, as sent in `errors` arrays and `error` messages.
///
/// This intentionally mirrors the `errors` entry shape from the GraphQL
/// response specification rather than any single executor's own error type,
/// since the engine core does not depend on one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Human-readable error message.
    pub message: String,

    /// Source locations the error is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<SourceLocation>>,

    /// Response field path the error is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Extension data, e.g. error codes. Extension hooks append entries
    /// here rather than replacing the vector outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl ErrorObject {
    /// Builds an [`ErrorObject`] carrying only a message, the common case
    /// for hook rejections and decode failures.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }
}

/// One request decoded from a `start`/`subscribe` message, independent of
/// which subprotocol carried it.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct OperationRequest {
    /// The GraphQL document text.
    pub query: String,

    /// Variables for the operation. Absent or `null` on the wire decodes to
    /// an empty map rather than failing, matching how both subprotocols'
    /// `StartPayload`/`SubscribePayload` treat a missing `variables` key.
    #[serde(default, deserialize_with = "default_for_null")]
    pub variables: Map<String, Value>,

    /// The operation name, when the document defines more than one.
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

/// One unit of output from an [`crate::executor::Executor`]: the result of a
/// query or mutation, or one event of a subscription.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataResult {
    /// The result data, or `None` if execution failed before producing any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Field-level errors encountered while producing `data`. Distinct from
    /// operation-level errors, which abort the operation outright instead
    /// of being folded into a `DataResult`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,

    /// Extension data. Registered extension hooks append their errors under
    /// `extensions.errors` on the terminal frame of an operation (the "combine
    /// errors" behavior inherited from the legacy protocol).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl DataResult {
    /// A successful result with no errors.
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            extensions: None,
        }
    }

    /// A result carrying only field errors, no data.
    pub fn errors(errors: Vec<ErrorObject>) -> Self {
        Self {
            data: None,
            errors,
            extensions: None,
        }
    }

    /// Appends `errors` (produced by registered extension hooks) onto this
    /// result's `extensions.errors` list, merging across every hook that
    /// contributed one rather than replacing prior entries.
    pub fn merge_extension_errors(&mut self, errors: Vec<ErrorObject>) {
        if errors.is_empty() {
            return;
        }
        let extensions = self.extensions.get_or_insert_with(Map::new);
        let Value::Array(list) = extensions
            .entry("errors".to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
        else {
            return;
        };
        list.extend(
            errors
                .into_iter()
                .map(|e| serde_json::to_value(e).unwrap_or(Value::Null)),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn merges_extension_errors_across_multiple_calls() {
        let mut result = DataResult::ok(Value::Null);
        result.merge_extension_errors(vec![ErrorObject::message("one")]);
        result.merge_extension_errors(vec![ErrorObject::message("two")]);

        let errors = result.extensions.unwrap()["errors"].as_array().unwrap().len();
        assert_eq!(errors, 2);
    }

    #[test]
    fn merging_no_errors_leaves_extensions_untouched() {
        let mut result = DataResult::ok(Value::Null);
        result.merge_extension_errors(Vec::new());
        assert!(result.extensions.is_none());
    }

    #[test]
    fn variables_default_to_empty_map_when_null_or_absent() {
        let req: OperationRequest =
            serde_json::from_str(r#"{"query":"{ x }","variables":null}"#).unwrap();
        assert!(req.variables.is_empty());

        let req: OperationRequest = serde_json::from_str(r#"{"query":"{ x }"}"#).unwrap();
        assert!(req.variables.is_empty());
    }
}

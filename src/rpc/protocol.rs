//! JSON-RPC 2.0 message types and the error codes the daemon answers with.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

pub const JOB_NOT_FOUND: i32 = -32001;
pub const UNSUPPORTED_JOB_TYPE: i32 = -32002;
pub const AUTHORIZATION_FAILED: i32 = -32003;
pub const SERVER_UNREACHABLE: i32 = -32004;
/// The job exists but has no report: still running, failed, or a rename.
pub const REPORT_UNAVAILABLE: i32 = -32005;

/// A call, or a notification when `id` is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Dotted method name, e.g. `jobs.submit`.
    pub method: String,
    /// Named parameters. Methods without parameters accept `null` or absence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Echoed back in the response. Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Method result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// The request id, or `null` when the request could not be parsed.
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// One of the codes defined in this module.
    pub code: i32,
    /// Human-readable message, usually the job or submit error text.
    pub message: String,
    /// Extra structured detail. The daemon does not set it today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    pub fn call(method: &str, params: Option<Value>, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: Some(id),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err("jsonrpc must be \"2.0\"");
        }
        if self.method.trim().is_empty() {
            return Err("method must not be empty");
        }
        Ok(())
    }
}

impl Response {
    /// A result that fails to serialize is reported as an internal error.
    pub fn success(id: Value, result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self {
                jsonrpc: JSONRPC_VERSION.to_string(),
                result: Some(result),
                error: None,
                id,
            },
            Err(e) => Self::internal_error(id, format!("Failed to encode result: {}", e)),
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }

    pub fn parse_error() -> Self {
        Self::error(Value::Null, PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(id: Value) -> Self {
        Self::error(id, INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(id: Value, details: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, details)
    }

    pub fn internal_error(id: Value, details: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, details)
    }

    /// The result, or the error the daemon answered with. A response with
    /// neither yields `null`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trips_through_the_wire_form() {
        let request = Request::call("jobs.get", Some(json!({ "id": "0190" })), json!(7));
        let line = serde_json::to_string(&request).unwrap();
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","method":"jobs.get","params":{"id":"0190"},"id":7}"#
        );

        let parsed: Request = serde_json::from_str(&line).unwrap();
        assert!(parsed.validate().is_ok());
        assert!(!parsed.is_notification());
    }

    #[test]
    fn test_notification_has_no_id() {
        let parsed: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"jobs.cancel"}"#).unwrap();
        assert!(parsed.is_notification());
        assert!(parsed.params.is_none());
    }

    #[test]
    fn test_validate_rejects_version_and_blank_method() {
        let mut request = Request::call("daemon.status", None, json!(1));
        request.jsonrpc = "1.0".into();
        assert!(request.validate().is_err());

        let request = Request::call(" ", None, json!(1));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_error_response_omits_result() {
        let response = Response::error(json!("abc"), JOB_NOT_FOUND, "Job not found: x");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["error"]["code"], json!(-32001));
        assert!(value.get("result").is_none());
        assert_eq!(
            response.into_result().unwrap_err().to_string(),
            "Job not found: x (code -32001)"
        );
    }

    #[test]
    fn test_success_into_result() {
        let response = Response::success(json!(1), json!({ "jobId": "j" }));
        assert_eq!(response.into_result().unwrap()["jobId"], json!("j"));
    }
}

//! Error model for calls to the records service.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    /// Path to the offending field, e.g. `["body", "records", 0, "unit"]`.
    #[serde(default)]
    pub loc: Vec<Value>,
    pub msg: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl FieldError {
    /// Dotted field path without the leading `body` segment.
    pub fn field(&self) -> String {
        self.loc
            .iter()
            .filter(|segment| segment.as_str() != Some("body"))
            .map(|segment| match segment {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let field = self.field();
        if field.is_empty() {
            f.write_str(&self.msg)
        } else {
            write!(f, "{field}: {}", self.msg)
        }
    }
}

/// Errors surfaced to callers of the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request did not complete.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    /// A 401 that renewal did not resolve.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("request failed (HTTP {status}): {message}")]
    Service { status: StatusCode, message: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Shape of the `detail` field in error bodies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Fields(Vec<FieldError>),
    Message(String),
    Other(Value),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Detail>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    /// Builds the error for a non-success response.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

        let message = match parsed.detail {
            Some(Detail::Fields(errors)) if status != StatusCode::UNAUTHORIZED => {
                return ApiError::Validation(errors);
            }
            Some(Detail::Message(message)) => Some(message),
            Some(Detail::Other(Value::Object(map))) => map
                .get("message")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            _ => None,
        }
        .or(parsed.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

        if status == StatusCode::UNAUTHORIZED {
            ApiError::Unauthorized { message }
        } else {
            ApiError::Service { status, message }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// One-line message suitable for a notice, falling back to `fallback`
    /// when the error carries nothing the user can act on.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Unauthorized { message } | ApiError::Service { message, .. } => {
                message.clone()
            }
            ApiError::Validation(errors) => join_field_errors(errors),
            ApiError::Timeout => "The server took too long to respond".to_string(),
            _ => fallback.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn test_validation_list_becomes_field_errors() {
        let err = ApiError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &body(&json!({
                "detail": [
                    {"loc": ["body", "records", 0, "unit"], "msg": "field required", "type": "value_error.missing"},
                    {"loc": ["body", "email"], "msg": "value is not a valid email address"}
                ]
            })),
        );

        let ApiError::Validation(errors) = &err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field(), "records.0.unit");
        assert_eq!(errors[0].kind.as_deref(), Some("value_error.missing"));
        assert_eq!(
            err.to_string(),
            "validation failed: records.0.unit: field required, email: value is not a valid email address"
        );
    }

    #[test]
    fn test_string_detail_becomes_service_message() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            &body(&json!({"detail": "Email already registered"})),
        );
        assert!(matches!(
            &err,
            ApiError::Service { status, message }
                if *status == StatusCode::BAD_REQUEST && message == "Email already registered"
        ));
        assert_eq!(err.user_message("Registration failed"), "Email already registered");
    }

    #[test]
    fn test_message_field_is_used() {
        let err = ApiError::from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &body(&json!({"message": "database unavailable"})),
        );
        assert_eq!(
            err.to_string(),
            "request failed (HTTP 500 Internal Server Error): database unavailable"
        );
    }

    #[test]
    fn test_object_detail_with_message() {
        let err = ApiError::from_response(
            StatusCode::CONFLICT,
            &body(&json!({"detail": {"message": "duplicate record", "code": 17}})),
        );
        assert_eq!(err.user_message("fallback"), "duplicate record");
    }

    #[test]
    fn test_unparseable_body_falls_back_to_status_text() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, b"<html>oops</html>");
        assert_eq!(err.user_message("fallback"), "Bad Gateway");
    }

    #[test]
    fn test_401_maps_to_unauthorized() {
        let err = ApiError::from_response(
            StatusCode::UNAUTHORIZED,
            &body(&json!({"detail": "Could not validate credentials"})),
        );
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "unauthorized: Could not validate credentials");

        let empty = ApiError::from_response(StatusCode::UNAUTHORIZED, b"");
        assert_eq!(empty.user_message("fallback"), "Unauthorized");
    }

    #[test]
    fn test_storage_errors_keep_context() {
        let err: ApiError = anyhow::anyhow!("disk full").context("save credentials").into();
        assert!(format!("{err:#}").contains("save credentials"));
        assert_eq!(err.user_message("Login failed"), "Login failed");
    }
}

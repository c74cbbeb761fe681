use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

const HYPHENATED_UUID_LEN: usize = 36;
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Whatever a caller handed over as "the user id", before it is trusted.
///
/// Session layers hand user ids across loosely typed boundaries (decoded JSON,
/// form fields, an auth hook that has not resolved yet), so the guard accepts
/// every shape and rejects all but a UUID string.
#[derive(Debug, Clone, PartialEq)]
pub enum UserIdCandidate {
    Undefined,
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Structured(Value),
}

impl UserIdCandidate {
    fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Text(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Structured(Value::Array(_)) => "array",
            Self::Structured(_) => "object",
        }
    }
}

impl From<&str> for UserIdCandidate {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for UserIdCandidate {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for UserIdCandidate {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<Uuid> for UserIdCandidate {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&ValidatedUserId> for UserIdCandidate {
    fn from(value: &ValidatedUserId) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for UserIdCandidate {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for UserIdCandidate {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for UserIdCandidate {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T> From<Option<T>> for UserIdCandidate
where
    T: Into<UserIdCandidate>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}

impl From<Value> for UserIdCandidate {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text),
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            other => Self::Structured(other),
        }
    }
}

/// A user id that passed [`validate_user_id`]. Only the guard constructs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ValidatedUserId(Uuid);

impl ValidatedUserId {
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ValidatedUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("{context}: user id is missing ({kind})")]
    Missing { context: String, kind: &'static str },
    #[error("{context}: user id must be a string, got {kind}")]
    WrongType { context: String, kind: &'static str },
    #[error("{context}: user id is empty")]
    Empty { context: String },
    #[error("{context}: user id is not a UUID")]
    Malformed { context: String },
}

impl IdentityError {
    pub fn context(&self) -> &str {
        match self {
            Self::Missing { context, .. }
            | Self::WrongType { context, .. }
            | Self::Empty { context }
            | Self::Malformed { context } => context,
        }
    }
}

/// Validates and normalizes the acting user's id. `context` names the caller
/// and is carried in every failure message.
pub fn validate_user_id(
    candidate: impl Into<UserIdCandidate>,
    context: &str,
) -> Result<ValidatedUserId, IdentityError> {
    let candidate = candidate.into();
    let context = context.to_string();

    let text = match candidate {
        UserIdCandidate::Undefined | UserIdCandidate::Null => {
            return Err(IdentityError::Missing {
                kind: candidate.kind(),
                context,
            });
        }
        UserIdCandidate::Text(text) => text,
        other => {
            return Err(IdentityError::WrongType {
                kind: other.kind(),
                context,
            });
        }
    };

    let normalized = text.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(IdentityError::Empty { context });
    }
    if !has_uuid_shape(&normalized) {
        return Err(IdentityError::Malformed { context });
    }

    Uuid::parse_str(&normalized)
        .map(ValidatedUserId)
        .map_err(|_| IdentityError::Malformed { context })
}

fn has_uuid_shape(value: &str) -> bool {
    value.len() == HYPHENATED_UUID_LEN
        && value.char_indices().all(|(index, ch)| {
            if HYPHEN_POSITIONS.contains(&index) {
                ch == '-'
            } else {
                ch.is_ascii_hexdigit()
            }
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{IdentityError, UserIdCandidate, validate_user_id};

    #[test]
    fn accepts_and_normalizes_hyphenated_uuid() {
        let raw = "  6F9619FF-8B86-D011-B42D-00C04FC964FF ";
        let validated = validate_user_id(raw, "create_audit_record").expect("uuid should pass");

        assert_eq!(validated.to_string(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn rejects_missing_values_with_context() {
        let err = validate_user_id(None::<&str>, "create_voice_event")
            .expect_err("undefined must fail");
        assert!(matches!(err, IdentityError::Missing { kind: "undefined", .. }));
        assert!(err.to_string().contains("create_voice_event"));

        let err = validate_user_id(json!(null), "registry_lookup").expect_err("null must fail");
        assert!(matches!(err, IdentityError::Missing { kind: "null", .. }));
        assert_eq!(err.context(), "registry_lookup");
    }

    #[test]
    fn type_check_precedes_format_check() {
        for candidate in [
            UserIdCandidate::from(0_i64),
            UserIdCandidate::from(false),
            UserIdCandidate::from(f64::NAN),
            UserIdCandidate::from(json!({ "id": Uuid::new_v4().to_string() })),
            UserIdCandidate::from(json!([Uuid::new_v4().to_string()])),
        ] {
            let err = validate_user_id(candidate.clone(), "test").expect_err("non-strings must fail");
            assert!(
                matches!(err, IdentityError::WrongType { .. }),
                "expected type failure for {candidate:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_empty_and_malformed_strings() {
        assert!(matches!(
            validate_user_id("   ", "test"),
            Err(IdentityError::Empty { .. })
        ));

        for malformed in [
            "user-123",
            "6f9619ff8b86d011b42d00c04fc964ff",
            "{6f9619ff-8b86-d011-b42d-00c04fc964ff}",
            "6f9619ff-8b86-d011-b42d-00c04fc964fz",
            "urn:uuid:6f9619ff-8b86-d011-b42d-00c04fc964ff",
        ] {
            assert!(
                matches!(
                    validate_user_id(malformed, "test"),
                    Err(IdentityError::Malformed { .. })
                ),
                "{malformed} should be rejected"
            );
        }
    }
}

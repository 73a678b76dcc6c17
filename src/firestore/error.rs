use std::error::Error;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::app::AppError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirestoreErrorCode {
    InvalidArgument,
    MissingProjectId,
    Internal,
    NotFound,
    Aborted,
    DeadlineExceeded,
    ResourceExhausted,
    Unsupported,
}

impl FirestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirestoreErrorCode::InvalidArgument => "firestore/invalid-argument",
            FirestoreErrorCode::MissingProjectId => "firestore/missing-project-id",
            FirestoreErrorCode::Internal => "firestore/internal-error",
            FirestoreErrorCode::NotFound => "firestore/not-found",
            FirestoreErrorCode::Aborted => "firestore/aborted",
            FirestoreErrorCode::DeadlineExceeded => "firestore/deadline-exceeded",
            FirestoreErrorCode::ResourceExhausted => "firestore/resource-exhausted",
            FirestoreErrorCode::Unsupported => "firestore/unsupported",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FirestoreError {
    pub code: FirestoreErrorCode,
    message: String,
}

impl FirestoreError {
    pub fn new(code: FirestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Converts the error into the platform-neutral shape handed back across the bridge.
    pub fn to_native(&self) -> NativeError {
        NativeError::new(self.code_str(), self.message.clone())
    }
}

impl Display for FirestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for FirestoreError {}

impl From<AppError> for FirestoreError {
    fn from(err: AppError) -> Self {
        invalid_argument(err.to_string())
    }
}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Error payload shared by every platform: `{code, message, userInfo: {code, message}}`.
///
/// Codes are reported without their service prefix (`firestore/not-found` becomes `not-found`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeError {
    pub code: String,
    pub message: String,
    pub user_info: NativeErrorInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NativeErrorInfo {
    pub code: String,
    pub message: String,
}

impl NativeError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        let code = match code.split_once('/') {
            Some((_, short)) => short.to_string(),
            None => code.to_string(),
        };
        let message = message.into();
        Self {
            user_info: NativeErrorInfo {
                code: code.clone(),
                message: message.clone(),
            },
            code,
            message,
        }
    }
}

impl From<FirestoreError> for NativeError {
    fn from(err: FirestoreError) -> Self {
        err.to_native()
    }
}

impl Display for NativeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for NativeError {}

pub fn invalid_argument(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidArgument, message)
}

pub fn missing_project_id() -> FirestoreError {
    FirestoreError::new(
        FirestoreErrorCode::MissingProjectId,
        "Firebase options must include a project_id to use Firestore",
    )
}

pub fn internal_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::NotFound, message)
}

pub fn aborted(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Aborted, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::DeadlineExceeded, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::ResourceExhausted, message)
}

pub fn unsupported(operation: &str) -> FirestoreError {
    FirestoreError::new(
        FirestoreErrorCode::Unsupported,
        format!("{operation} is not supported in this environment."),
    )
}

use std::fmt;

use thiserror::Error;

/// Classified GraphQL error codes reported by the Data API in `extensions.code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataApiErrorKind {
    AlreadyExists,
    NotFound,
    TooManyResources,
    PermissionDenied,
    ImmutableResource,
    BadUserInput { field: String },
    ResourceDeleted,
    /// Any code outside the known set, or a malformed `BAD_USER_INPUT` without a field.
    Other(String),
}

impl DataApiErrorKind {
    pub(crate) fn classify(code: &str, field: Option<&str>) -> Self {
        match code {
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "NOT_FOUND" => Self::NotFound,
            "TOO_MANY_RESOURCES" => Self::TooManyResources,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "IMMUTABLE_RESOURCE" => Self::ImmutableResource,
            // Schema-level input errors carry no field and are caller bugs.
            "BAD_USER_INPUT" => match field {
                Some(field) => Self::BadUserInput {
                    field: field.to_string(),
                },
                None => Self::Other(code.to_string()),
            },
            "RESOURCE_DELETED" => Self::ResourceDeleted,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::TooManyResources => "TOO_MANY_RESOURCES",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ImmutableResource => "IMMUTABLE_RESOURCE",
            Self::BadUserInput { .. } => "BAD_USER_INPUT",
            Self::ResourceDeleted => "RESOURCE_DELETED",
            Self::Other(code) => code.as_str(),
        }
    }
}

impl fmt::Display for DataApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
/// Enumerates failures returned by [`crate::DataApiClient`].
pub enum DataApiError {
    #[error("data api transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("data api returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("data api response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("data api returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("data api query failed ({kind}): {message}")]
    Query {
        kind: DataApiErrorKind,
        message: String,
    },
}

impl DataApiError {
    /// Returns the classified GraphQL error kind, when the server reported one.
    pub fn kind(&self) -> Option<&DataApiErrorKind> {
        match self {
            Self::Query { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// True for failures where retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::InvalidResponse(_) | Self::Query { .. } => false,
        }
    }
}

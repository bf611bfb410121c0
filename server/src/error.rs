use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors that can surface from a single request or a single tick of a
/// reconciliation loop. Recoverable by construction: returning one of
/// these must never leave the peer index or the device out of sync.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("bson serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    #[error("bson deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("address space exhausted")]
    AddressSpaceExhausted,
}

impl From<&ServerError> for StatusCode {
    fn from(error: &ServerError) -> Self {
        match error {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ServerError::Duplicate(_) => StatusCode::CONFLICT,
            ServerError::Database(_)
            | ServerError::BsonSer(_)
            | ServerError::BsonDe(_)
            | ServerError::Io(_)
            | ServerError::Json(_)
            | ServerError::AddressSpaceExhausted => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {}", self);
        }
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Errors that the supervisor treats as un-recoverable: the process
/// exits rather than risk a reconciliation loop or change-stream tailer
/// silently diverging from the document database.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("device controller failure: {0}")]
    Device(std::io::Error),

    #[error("database connection lost: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("change stream {stream} failed: {source}")]
    ChangeStream {
        stream: &'static str,
        #[source]
        source: mongodb::error::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A reconciliation tick only ever fails via a database or (de)serialization
/// error bubbling out of a `db::*Collection` call; any `ServerError` raised
/// from inside a loop tick is therefore treated as fatal rather than
/// something the loop could plausibly recover from on its own.
impl From<ServerError> for FatalError {
    fn from(error: ServerError) -> Self {
        match error {
            ServerError::Database(e) => FatalError::Database(e),
            other => FatalError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

use bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Mirrors the original's `Log` struct and its `CustomWriter` tee: every
/// `log` record emitted by this server is also written here with a
/// 48-hour TTL (index created in `db::ensure_indexes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub time: i64,
    pub level: String,
    #[serde(rename = "msg")]
    pub message: String,
    pub peer: String,
    #[serde(rename = "publicAddress")]
    pub public_address: String,
    #[serde(rename = "expireAt")]
    pub expire_at: BsonDateTime,
}

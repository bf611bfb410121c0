use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// A shared quota and expiration applied across a set of peers. The
/// group loop cascades `allowedUsage`/`expiresAt`/`disabled` changes
/// down onto every member; it never reads member state back up except
/// to sum `totalTX`/`totalRX` for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    #[serde(rename = "peerIDs", default)]
    pub peer_ids: Vec<String>,
    #[serde(rename = "allowedUsage")]
    pub allowed_usage: i64,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    #[serde(rename = "totalTX", default)]
    pub total_tx: i64,
    #[serde(rename = "totalRX", default)]
    pub total_rx: i64,
    #[serde(default)]
    pub disabled: bool,
}

impl Group {
    pub fn over_quota_or_expired(&self, now_ms: i64) -> bool {
        self.total_tx + self.total_rx >= self.allowed_usage || (self.expires_at > 0 && now_ms >= self.expires_at)
    }
}

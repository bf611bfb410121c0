use serde::{Deserialize, Serialize};

/// Mirrors the original's free-form `role string`, closed to the three
/// values the fleet actually authorizes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Distributor,
    User,
}

/// Per-server telemetry for a peer, keyed by the owning server's public
/// address. One entry exists per server that has ever observed the
/// peer's handshakes; entries are upserted by that server's peer loop
/// and never touched by any other server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpecificInfo {
    pub address: String,
    #[serde(rename = "lastHandshakeTime")]
    pub last_handshake_time: String,
    pub endpoint: String,
    #[serde(rename = "currentTX")]
    pub current_tx: i64,
    #[serde(rename = "currentRX")]
    pub current_rx: i64,
}

/// The fleet's one source of truth for a WireGuard client. `public_key`
/// doubles as the document id, matching the original's
/// `ID string json:"_id" bson:"_id"`.
///
/// The five transient fields below are never persisted: they exist only
/// so a single in-memory `Peer` can carry both the durable record and
/// the local server's live view of it between reconciliation ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    #[serde(rename = "_id")]
    pub public_key: String,
    pub role: Role,
    pub name: String,
    #[serde(rename = "preferredEndpoint", default, skip_serializing_if = "String::is_empty")]
    pub preferred_endpoint: String,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    pub disabled: bool,
    #[serde(rename = "allowedUsage")]
    pub allowed_usage: i64,
    #[serde(rename = "expiresAt")]
    pub expires_at: i64,
    #[serde(rename = "totalTX")]
    pub total_tx: i64,
    #[serde(rename = "totalRX")]
    pub total_rx: i64,
    #[serde(rename = "groupID", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<bson::oid::ObjectId>,
    #[serde(rename = "telegramChatID", default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<i64>,
    #[serde(rename = "serverSpecificInfo", default)]
    pub server_specific_info: Vec<ServerSpecificInfo>,

    /// Absolute kernel counters as of the last peer-loop tick on this
    /// server, used to compute this tick's delta. Never serialized.
    #[serde(skip)]
    pub temp_tx: i64,
    #[serde(skip)]
    pub temp_rx: i64,
    /// This server's live view, refreshed every peer-loop tick from the
    /// device snapshot. Never serialized.
    #[serde(skip)]
    pub endpoint: String,
    #[serde(skip)]
    pub current_tx: i64,
    #[serde(skip)]
    pub current_rx: i64,
    #[serde(skip)]
    pub last_handshake_time: String,
}

impl Peer {
    /// `true` once the peer has exceeded its data quota or passed its
    /// expiration, the two conditions that suspend a peer on the
    /// device without removing it from the fleet.
    pub fn over_quota_or_expired(&self, now_ms: i64) -> bool {
        self.total_tx + self.total_rx >= self.allowed_usage || (self.expires_at > 0 && now_ms >= self.expires_at)
    }

    pub fn find_ssi_mut(&mut self, address: &str) -> Option<&mut ServerSpecificInfo> {
        self.server_specific_info
            .iter_mut()
            .find(|ssi| ssi.address == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Distributor).unwrap(), "\"distributor\"");
    }

    #[test]
    fn over_quota_or_expired() {
        let mut peer = sample_peer();
        peer.allowed_usage = 200;
        assert!(!peer.over_quota_or_expired(1_000));

        peer.allowed_usage = 100;
        peer.total_tx = 60;
        peer.total_rx = 60;
        assert!(peer.over_quota_or_expired(1_000));

        peer.allowed_usage = 200;
        peer.total_tx = 0;
        peer.total_rx = 0;
        peer.expires_at = 500;
        assert!(peer.over_quota_or_expired(1_000));
        assert!(!peer.over_quota_or_expired(100));
    }

    /// A zero `allowedUsage` (as cascaded by a disabled group, or simply
    /// never configured) must force the quota gate regardless of actual
    /// traffic — the group loop relies on this to keep a member
    /// disabled by zeroing its quota rather than tracking a separate
    /// suspended flag.
    #[test]
    fn zero_allowed_usage_is_always_over_quota() {
        let peer = sample_peer();
        assert_eq!(peer.allowed_usage, 0);
        assert_eq!(peer.total_tx, 0);
        assert_eq!(peer.total_rx, 0);
        assert!(peer.over_quota_or_expired(0));
    }

    fn sample_peer() -> Peer {
        Peer {
            public_key: "pub".into(),
            role: Role::User,
            name: "alice".into(),
            preferred_endpoint: String::new(),
            allowed_ips: "10.0.0.2/32".into(),
            private_key: "priv".into(),
            disabled: false,
            allowed_usage: 0,
            expires_at: 0,
            total_tx: 0,
            total_rx: 0,
            group_id: None,
            telegram_chat_id: None,
            server_specific_info: Vec::new(),
            temp_tx: 0,
            temp_rx: 0,
            endpoint: String::new(),
            current_tx: 0,
            current_rx: 0,
            last_handshake_time: String::new(),
        }
    }
}

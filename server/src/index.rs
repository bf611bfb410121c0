use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::Peer;

/// The in-memory peer table every HTTP handler and reconciliation loop
/// reads from, keyed by `public_key`. This is the single source of
/// truth for the HTTP surface; the database is a durable mirror, not
/// the other way around. A coarse `RwLock` guards the whole table —
/// critical sections are kept short and never span a blocking database
/// or kernel call, matching the teacher's `Db`/`Endpoints` lock
/// discipline in `server/src/main.rs`.
pub struct PeerIndex {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerIndex {
    pub fn new() -> Self {
        Self { peers: RwLock::new(HashMap::new()) }
    }

    pub fn from_peers(peers: Vec<Peer>) -> Self {
        let map = peers.into_iter().map(|p| (p.public_key.clone(), p)).collect();
        Self { peers: RwLock::new(map) }
    }

    pub fn insert(&self, peer: Peer) {
        self.peers.write().insert(peer.public_key.clone(), peer);
    }

    pub fn remove(&self, public_key: &str) -> Option<Peer> {
        self.peers.write().remove(public_key)
    }

    pub fn get(&self, public_key: &str) -> Option<Peer> {
        self.peers.read().get(public_key).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Peer> {
        self.peers.read().values().find(|p| p.name == name).cloned()
    }

    pub fn get_by_allowed_ip(&self, allowed_ip: &str) -> Option<Peer> {
        self.peers.read().values().find(|p| p.allowed_ips == allowed_ip).cloned()
    }

    pub fn all(&self) -> Vec<Peer> {
        self.peers.read().values().cloned().collect()
    }

    pub fn public_keys(&self) -> Vec<String> {
        self.peers.read().keys().cloned().collect()
    }

    pub fn allowed_ips(&self) -> Vec<String> {
        self.peers.read().values().map(|p| p.allowed_ips.clone()).collect()
    }

    /// Runs `f` against the peer in place, under a single write lock
    /// held for the whole read-modify-write. Two callers racing on the
    /// same key (the peer loop's telemetry tick vs. the update
    /// change-stream consumer) must never interleave: one exclusive
    /// critical section, not a read followed by a separate write.
    pub fn mutate<T>(&self, public_key: &str, f: impl FnOnce(&mut Peer) -> T) -> Option<T> {
        let mut guard = self.peers.write();
        let peer = guard.get_mut(public_key)?;
        Some(f(peer))
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn peer(key: &str, name: &str) -> Peer {
        Peer {
            public_key: key.into(),
            role: Role::User,
            name: name.into(),
            preferred_endpoint: String::new(),
            allowed_ips: format!("10.0.0.{key}/32"),
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

    #[test]
    fn insert_get_remove() {
        let index = PeerIndex::new();
        index.insert(peer("1", "alice"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("1").unwrap().name, "alice");
        assert!(index.remove("1").is_some());
        assert!(index.get("1").is_none());
    }

    #[test]
    fn mutate_round_trips() {
        let index = PeerIndex::new();
        index.insert(peer("1", "alice"));
        index.mutate("1", |p| p.total_tx += 100);
        assert_eq!(index.get("1").unwrap().total_tx, 100);
    }

    #[test]
    fn lookup_by_name_and_ip() {
        let index = PeerIndex::new();
        index.insert(peer("1", "alice"));
        assert_eq!(index.get_by_name("alice").unwrap().public_key, "1");
        assert_eq!(index.get_by_allowed_ip("10.0.0.1/32").unwrap().public_key, "1");
    }
}

use std::time::SystemTime;

use bson::doc;

use crate::db::{GroupCollection, PeerCollection};
use crate::device::{DeviceController, PeerSnapshot};
use crate::index::PeerIndex;
use crate::model::{Peer, ServerSpecificInfo};

use super::TICK;

/// Runs forever, ticking once a second: reads the device's live
/// counters, gates each peer on quota/expiration, computes this
/// server's telemetry delta for every peer that's still active, and
/// writes the results back to the index and the database. Grounded in
/// `main.go`'s peers-loop goroutine.
pub async fn run_peer_loop(
    index: std::sync::Arc<PeerIndex>,
    device: std::sync::Arc<DeviceController>,
    peers: PeerCollection,
    groups: GroupCollection,
    public_address: String,
) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        if let Err(e) = tick(&index, &device, &peers, &groups, &public_address).await {
            log::error!("peer loop tick failed: {e}");
        }
    }
}

async fn tick(
    index: &PeerIndex,
    device: &DeviceController,
    peers: &PeerCollection,
    groups: &GroupCollection,
    public_address: &str,
) -> Result<(), crate::ServerError> {
    let now_ms = now_millis();
    let snapshot = device.snapshot()?;
    let mut group_deltas: std::collections::HashMap<bson::oid::ObjectId, (i64, i64)> =
        std::collections::HashMap::new();

    for entry in &snapshot {
        let Some(peer) = index.get(&entry.public_key) else { continue };

        if peer.over_quota_or_expired(now_ms) {
            if !peer.disabled {
                suspend(index, device, &entry.public_key)?;
                peers.set_fields(&entry.public_key, doc! { "disabled": true }).await?;
                log::info!("peer {} disabled (quota or expiration)", peer.name);
            }
            continue;
        }

        if peer.disabled {
            resume(index, device, &entry.public_key)?;
            peers.set_fields(&entry.public_key, doc! { "disabled": false }).await?;
            log::info!("peer {} enabled", peer.name);
            continue;
        }

        let Some((current_tx, current_rx, ssi)) =
            apply_telemetry(index, &entry.public_key, entry, now_ms, public_address)
        else {
            continue;
        };

        upsert_ssi(peers, &entry.public_key, public_address, bson::to_bson(&ssi)?).await?;
        peers
            .increment_totals(&entry.public_key, current_tx.max(0), current_rx.max(0))
            .await?;

        if let Some(group_id) = peer.group_id {
            let slot = group_deltas.entry(group_id).or_insert((0, 0));
            slot.0 += current_tx.max(0);
            slot.1 += current_rx.max(0);
        }
    }

    for (group_id, (tx, rx)) in group_deltas {
        groups.increment_totals(group_id, tx, rx).await?;
    }

    Ok(())
}

fn suspend(index: &PeerIndex, device: &DeviceController, public_key: &str) -> Result<(), crate::ServerError> {
    let key = wireguard_control::Key::from_base64(public_key)
        .map_err(|_| crate::ServerError::InvalidQuery(format!("bad public key {public_key}")))?;
    device.set_suspended(&key, true)?;
    index.mutate(public_key, |p| p.disabled = true);
    Ok(())
}

fn resume(index: &PeerIndex, device: &DeviceController, public_key: &str) -> Result<(), crate::ServerError> {
    let key = wireguard_control::Key::from_base64(public_key)
        .map_err(|_| crate::ServerError::InvalidQuery(format!("bad public key {public_key}")))?;
    device.set_suspended(&key, false)?;
    index.mutate(public_key, |p| p.disabled = false);
    Ok(())
}

/// Computes this tick's TX/RX delta for one peer against its previous
/// absolute counters, updates the in-memory index, and returns the
/// delta plus a `ServerSpecificInfo` reflecting this server's view,
/// ready to be upserted into the peer's `serverSpecificInfo[]`.
fn apply_telemetry(
    index: &PeerIndex,
    public_key: &str,
    snapshot: &PeerSnapshot,
    now_ms: i64,
    public_address: &str,
) -> Option<(i64, i64, ServerSpecificInfo)> {
    index.mutate(public_key, |peer: &mut Peer| {
        let current_tx = snapshot.tx_bytes as i64 - peer.temp_tx;
        let current_rx = snapshot.rx_bytes as i64 - peer.temp_rx;
        peer.temp_tx = snapshot.tx_bytes as i64;
        peer.temp_rx = snapshot.rx_bytes as i64;
        peer.current_tx = current_tx;
        peer.current_rx = current_rx;
        peer.total_tx += current_tx.max(0);
        peer.total_rx += current_rx.max(0);
        peer.endpoint = snapshot
            .endpoint
            .map(|e| e.to_string())
            .unwrap_or_default();
        peer.last_handshake_time = snapshot
            .last_handshake_time
            .map(|t| format_handshake_age(t, now_ms))
            .unwrap_or_default();

        let ssi = ServerSpecificInfo {
            address: public_address.to_string(),
            last_handshake_time: peer.last_handshake_time.clone(),
            endpoint: peer.endpoint.clone(),
            current_tx,
            current_rx,
        };
        if let Some(existing) = peer.find_ssi_mut(public_address) {
            *existing = ssi.clone();
        } else {
            peer.server_specific_info.push(ssi.clone());
        }
        (current_tx, current_rx, ssi)
    })
}

async fn upsert_ssi(
    peers: &PeerCollection,
    public_key: &str,
    public_address: &str,
    ssi_bson: bson::Bson,
) -> Result<(), crate::ServerError> {
    // Try updating an existing element for this server first; if no
    // document matched (this server has never recorded telemetry for
    // this peer before), push a new element instead.
    let updated = peers
        .set_fields_matching(
            public_key,
            doc! { "serverSpecificInfo.address": public_address },
            doc! { "serverSpecificInfo.$": ssi_bson.clone() },
        )
        .await?;
    if !updated {
        peers.push_ssi(public_key, ssi_bson).await?;
    }
    Ok(())
}

fn format_handshake_age(handshake: SystemTime, now_ms: i64) -> String {
    let handshake_ms = handshake
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let delta_ms = (now_ms - handshake_ms).unsigned_abs();
    format!("{}s", delta_ms / 1000)
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn peer() -> Peer {
        Peer {
            public_key: "abc".into(),
            role: Role::User,
            name: "alice".into(),
            preferred_endpoint: String::new(),
            allowed_ips: "10.0.0.2/32".into(),
            private_key: "priv".into(),
            disabled: false,
            allowed_usage: 1000,
            expires_at: 0,
            total_tx: 0,
            total_rx: 0,
            group_id: None,
            telegram_chat_id: None,
            server_specific_info: Vec::new(),
            temp_tx: 100,
            temp_rx: 50,
            endpoint: String::new(),
            current_tx: 0,
            current_rx: 0,
            last_handshake_time: String::new(),
        }
    }

    #[test]
    fn computes_delta_and_updates_ssi() {
        let index = PeerIndex::new();
        index.insert(peer());
        let snapshot = PeerSnapshot {
            public_key: "abc".into(),
            endpoint: None,
            rx_bytes: 80,
            tx_bytes: 150,
            last_handshake_time: None,
        };
        let (tx, rx, ssi) = apply_telemetry(&index, "abc", &snapshot, 0, "server-a").unwrap();
        assert_eq!(tx, 50);
        assert_eq!(rx, 30);
        assert_eq!(ssi.address, "server-a");

        let updated = index.get("abc").unwrap();
        assert_eq!(updated.total_tx, 50);
        assert_eq!(updated.total_rx, 30);
        assert_eq!(updated.temp_tx, 150);
        assert_eq!(updated.server_specific_info.len(), 1);
    }
}

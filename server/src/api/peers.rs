use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;

use crate::api::auth::shares_name_group;
use crate::error::ServerError;
use crate::ip_allocator::next_unassigned;
use crate::model::{Peer, Role, ServerSpecificInfo};
use crate::Engine;

/// `admin` sees everything; `distributor`/`user` only see peers whose
/// name shares their own name-group prefix.
fn visible_to(actor: &Peer, peer: &Peer) -> bool {
    matches!(actor.role, Role::Admin) || shares_name_group(actor, peer)
}

pub async fn list_peers(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
) -> Json<Vec<Peer>> {
    let peers = engine.index.all().into_iter().filter(|p| visible_to(&actor, p)).collect();
    Json(peers)
}

pub async fn get_peer(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path(id): Path<String>,
) -> Result<Json<Peer>, ServerError> {
    let peer = engine.index.get(&id).ok_or(ServerError::NotFound)?;
    if !visible_to(&actor, &peer) {
        return Err(ServerError::Unauthorized);
    }
    Ok(Json(peer))
}

#[derive(Debug, Deserialize)]
pub struct CreatePeer {
    pub name: String,
    pub role: Role,
    pub allowed_usage: i64,
    pub expires_at: i64,
}

pub async fn create_peer(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Json(body): Json<CreatePeer>,
) -> Result<Json<Peer>, ServerError> {
    if !matches!(actor.role, Role::Admin) {
        return Err(ServerError::Unauthorized);
    }

    let keypair = wireguard_control::KeyPair::generate();
    let base: crate::ip_allocator::IpAddress = engine.config.interface_address.parse()?;
    let peers = crate::db::PeerCollection::new(&engine.db);

    // A duplicate-key insert means another server (or another request on
    // this one) claimed the same address between our allocation scan and
    // our write; re-scan against the now-current device state and retry
    // rather than fail the request, mirroring the original's `findIP:`
    // retry loop.
    const MAX_ATTEMPTS: u32 = 16;
    let mut peer = None;
    for attempt in 0..MAX_ATTEMPTS {
        let taken = engine.device.taken_allowed_ips()?;
        let address = next_unassigned(base, &taken)?;

        let candidate = Peer {
            public_key: keypair.public.to_base64(),
            role: body.role,
            name: body.name.clone(),
            preferred_endpoint: String::new(),
            allowed_ips: address.to_slash_32(),
            private_key: keypair.private.to_base64(),
            disabled: false,
            allowed_usage: body.allowed_usage,
            expires_at: body.expires_at,
            total_tx: 0,
            total_rx: 0,
            group_id: None,
            telegram_chat_id: None,
            server_specific_info: vec![ServerSpecificInfo {
                address: engine.config.public_address.clone(),
                last_handshake_time: String::new(),
                endpoint: String::new(),
                current_tx: 0,
                current_rx: 0,
            }],
            temp_tx: 0,
            temp_rx: 0,
            endpoint: String::new(),
            current_tx: 0,
            current_rx: 0,
            last_handshake_time: String::new(),
        };

        match peers.insert(&candidate).await {
            Ok(()) => {
                peer = Some(candidate);
                break;
            },
            Err(ServerError::Duplicate(_)) if attempt + 1 < MAX_ATTEMPTS => {
                log::warn!("address {} collided, retrying allocation", candidate.allowed_ips);
                continue;
            },
            Err(e) => return Err(e),
        }
    }
    let peer = peer.ok_or(ServerError::AddressSpaceExhausted)?;

    engine.device.install(&keypair.public, &peer.allowed_ips)?;
    engine.index.insert(peer.clone());
    Ok(Json(peer))
}

pub async fn delete_peer(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path(id): Path<String>,
) -> Result<(), ServerError> {
    let peer = engine.index.get(&id).ok_or(ServerError::NotFound)?;
    if !matches!(actor.role, Role::Admin) {
        return Err(ServerError::Unauthorized);
    }
    let key = wireguard_control::Key::from_base64(&peer.public_key)
        .map_err(|_| ServerError::InvalidQuery("invalid public key".into()))?;
    crate::db::PeerCollection::new(&engine.db).delete(&id).await?;
    engine.device.remove(&key)?;
    engine.index.remove(&id);
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct PatchPeer {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub allowed_usage: Option<i64>,
    pub expires_at: Option<i64>,
    pub group_id: Option<bson::oid::ObjectId>,
}

pub async fn patch_peer(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path(id): Path<String>,
    Json(patch): Json<PatchPeer>,
) -> Result<Json<Peer>, ServerError> {
    if !matches!(actor.role, Role::Admin) {
        return Err(ServerError::Unauthorized);
    }
    let mut fields = bson::Document::new();
    if let Some(name) = &patch.name {
        fields.insert("name", name);
    }
    if let Some(role) = &patch.role {
        fields.insert("role", bson::to_bson(role)?);
    }
    if let Some(usage) = patch.allowed_usage {
        fields.insert("allowedUsage", usage);
    }
    if let Some(expires_at) = patch.expires_at {
        fields.insert("expiresAt", expires_at);
    }
    if let Some(group_id) = patch.group_id {
        fields.insert("groupID", group_id);
    }

    let peer = crate::db::PeerCollection::new(&engine.db)
        .set_fields(&id, fields)
        .await?
        .ok_or(ServerError::NotFound)?;
    engine.index.insert(peer.clone());
    Ok(Json(peer))
}

/// Resets a peer's cumulative usage counters, matching `PutPeers` in
/// the original (the one mutation the HTTP surface makes with `PUT`).
pub async fn reset_peer_usage(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path(id): Path<String>,
) -> Result<Json<Peer>, ServerError> {
    if !matches!(actor.role, Role::Admin) {
        return Err(ServerError::Unauthorized);
    }
    let peer = crate::db::PeerCollection::new(&engine.db)
        .set_fields(&id, bson::doc! { "totalTX": 0_i64, "totalRX": 0_i64 })
        .await?
        .ok_or(ServerError::NotFound)?;
    engine.index.insert(peer.clone());
    Ok(Json(peer))
}

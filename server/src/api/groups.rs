use axum::extract::{Extension, Path, State};
use axum::Json;
use bson::oid::ObjectId;
use serde::Deserialize;

use crate::db::GroupCollection;
use crate::error::ServerError;
use crate::model::{Group, Peer, Role};
use crate::Engine;

fn owns(actor: &Peer, group: &Group) -> bool {
    matches!(actor.role, Role::Admin) || group.owner_id == actor.public_key
}

pub async fn list_groups(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
) -> Result<Json<Vec<Group>>, ServerError> {
    let groups = GroupCollection::new(&engine.db).list_all().await?;
    Ok(Json(groups.into_iter().filter(|g| owns(&actor, g)).collect()))
}

pub async fn get_group(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path(id): Path<ObjectId>,
) -> Result<Json<Group>, ServerError> {
    let group = GroupCollection::new(&engine.db).get(id).await?.ok_or(ServerError::NotFound)?;
    if !owns(&actor, &group) {
        return Err(ServerError::Unauthorized);
    }
    Ok(Json(group))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub allowed_usage: i64,
    pub expires_at: i64,
}

pub async fn create_group(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Json(body): Json<CreateGroup>,
) -> Result<Json<Group>, ServerError> {
    if !matches!(actor.role, Role::Admin | Role::Distributor) {
        return Err(ServerError::Unauthorized);
    }
    let group = Group {
        id: ObjectId::new(),
        name: body.name,
        owner_id: actor.public_key,
        peer_ids: Vec::new(),
        allowed_usage: body.allowed_usage,
        expires_at: body.expires_at,
        total_tx: 0,
        total_rx: 0,
        disabled: false,
    };
    GroupCollection::new(&engine.db).insert(&group).await?;
    Ok(Json(group))
}

pub async fn delete_group(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path(id): Path<ObjectId>,
) -> Result<(), ServerError> {
    let groups = GroupCollection::new(&engine.db);
    let group = groups.get(id).await?.ok_or(ServerError::NotFound)?;
    if !owns(&actor, &group) {
        return Err(ServerError::Unauthorized);
    }
    groups.delete(id).await?;
    Ok(())
}

/// `PUT /api/groups/:groupID/:peerID` — adds a peer to a group's
/// membership on both sides of the back-reference.
pub async fn add_peer_to_group(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path((group_id, peer_id)): Path<(ObjectId, String)>,
) -> Result<(), ServerError> {
    let groups = GroupCollection::new(&engine.db);
    let group = groups.get(group_id).await?.ok_or(ServerError::NotFound)?;
    if !owns(&actor, &group) {
        return Err(ServerError::Unauthorized);
    }

    let peers = crate::db::PeerCollection::new(&engine.db);
    peers
        .set_fields(&peer_id, bson::doc! { "groupID": group_id })
        .await?
        .ok_or(ServerError::NotFound)?;

    let mut peer_ids = group.peer_ids;
    if !peer_ids.contains(&peer_id) {
        peer_ids.push(peer_id);
    }
    groups.set_fields(group_id, bson::doc! { "peerIDs": peer_ids }).await?;
    Ok(())
}

/// `DELETE /api/groups/:groupID/:peerID` — removes a peer from a
/// group's membership on both sides of the back-reference.
pub async fn remove_peer_from_group(
    State(engine): State<Engine>,
    Extension(actor): Extension<Peer>,
    Path((group_id, peer_id)): Path<(ObjectId, String)>,
) -> Result<(), ServerError> {
    let groups = GroupCollection::new(&engine.db);
    let group = groups.get(group_id).await?.ok_or(ServerError::NotFound)?;
    if !owns(&actor, &group) {
        return Err(ServerError::Unauthorized);
    }

    let peers = crate::db::PeerCollection::new(&engine.db);
    peers.set_fields(&peer_id, bson::doc! { "groupID": bson::Bson::Null }).await?;

    let peer_ids: Vec<_> = group.peer_ids.into_iter().filter(|p| p != &peer_id).collect();
    groups.set_fields(group_id, bson::doc! { "peerIDs": peer_ids }).await?;
    Ok(())
}

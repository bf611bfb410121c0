use bson::doc;
use futures_util::StreamExt;
use mongodb::Database;

use crate::changestream::FieldUpdate;
use crate::device::DeviceController;
use crate::error::FatalError;
use crate::index::PeerIndex;
use crate::model::Peer;

/// Tails `peers` for updates from other servers (or this server's own
/// writes, which are idempotent to re-apply) and folds each changed
/// field into the in-memory index, re-pointing the device's endpoint
/// for the peer when `preferredEndpoint` changes. Grounded in
/// `main.go`'s update-events goroutine; the original's untyped
/// `map[string]interface{}` switch becomes a typed `FieldUpdate` match.
pub async fn run_update_consumer(
    db: Database,
    index: std::sync::Arc<PeerIndex>,
    device: std::sync::Arc<DeviceController>,
    public_address: String,
) -> Result<(), FatalError> {
    let collection = db.collection::<bson::Document>("peers");
    let pipeline = [doc! { "$match": { "operationType": "update" } }];
    let mut stream = collection
        .watch(pipeline, None)
        .await
        .map_err(|e| FatalError::ChangeStream { stream: "peers.update", source: e })?;

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| FatalError::ChangeStream { stream: "peers.update", source: e })?;
        let Some(document_key) = event.document_key else { continue };
        let Ok(id) = document_key.get_str("_id") else { continue };

        if index.get(id).is_none() {
            log::error!("received update for a peer not present in the local index: {id}");
            continue;
        }

        let Some(update_description) = event.update_description else { continue };

        for (key, value) in update_description.updated_fields {
            let field = match FieldUpdate::try_from((key.as_str(), &value)) {
                Ok(field) => field,
                Err(e) => {
                    log::error!("peer {id}: {e}");
                    continue;
                },
            };
            apply_field(&index, &device, id, field, &public_address);
        }
    }

    Ok(())
}

fn apply_field(
    index: &PeerIndex,
    device: &DeviceController,
    public_key: &str,
    field: FieldUpdate,
    public_address: &str,
) {
    match field {
        FieldUpdate::GroupId(group_id) => {
            index.mutate(public_key, |p: &mut Peer| p.group_id = Some(group_id));
        },
        FieldUpdate::TelegramChatId(id) => {
            index.mutate(public_key, |p: &mut Peer| p.telegram_chat_id = Some(id));
        },
        FieldUpdate::TotalTx(v) => {
            index.mutate(public_key, |p: &mut Peer| p.total_tx = v);
        },
        FieldUpdate::TotalRx(v) => {
            index.mutate(public_key, |p: &mut Peer| p.total_rx = v);
        },
        FieldUpdate::AllowedUsage(v) => {
            index.mutate(public_key, |p: &mut Peer| p.allowed_usage = v);
        },
        FieldUpdate::ExpiresAt(v) => {
            index.mutate(public_key, |p: &mut Peer| p.expires_at = v);
        },
        FieldUpdate::Disabled => {
            // The peer loop on the owning server is the sole writer of
            // this field's device-visible effect; nothing to do here.
        },
        FieldUpdate::Name(name) => {
            index.mutate(public_key, |p: &mut Peer| p.name = name);
        },
        FieldUpdate::Role(role) => {
            index.mutate(public_key, |p: &mut Peer| p.role = role);
        },
        FieldUpdate::PreferredEndpoint(endpoint) => {
            update_preferred_endpoint(index, device, public_key, endpoint);
        },
        FieldUpdate::RemoteServerSpecificInfo(ssi) => {
            if ssi.address != public_address {
                index.mutate(public_key, |p: &mut Peer| {
                    if let Some(existing) = p.find_ssi_mut(&ssi.address) {
                        *existing = ssi;
                    } else {
                        p.server_specific_info.push(ssi);
                    }
                });
            }
        },
        FieldUpdate::Unrecognized(_) => {},
    }
}

fn update_preferred_endpoint(
    index: &PeerIndex,
    device: &DeviceController,
    public_key: &str,
    endpoint: String,
) {
    let Ok(key) = wireguard_control::Key::from_base64(public_key) else {
        log::error!("peer {public_key}: invalid public key, cannot update endpoint");
        return;
    };

    if endpoint.is_empty() {
        index.mutate(public_key, |p: &mut Peer| p.preferred_endpoint.clear());
        return;
    }

    match endpoint.parse() {
        Ok(socket_addr) => {
            if let Err(e) = device.update_endpoint(&key, socket_addr) {
                log::error!("peer {public_key}: failed to update endpoint: {e}");
                return;
            }
            index.mutate(public_key, |p: &mut Peer| p.preferred_endpoint = endpoint.clone());
        },
        Err(e) => log::error!("peer {public_key}: invalid preferred endpoint {endpoint}: {e}"),
    }
}

use bson::doc;
use futures_util::StreamExt;
use mongodb::Database;

use crate::device::DeviceController;
use crate::error::FatalError;
use crate::index::PeerIndex;

/// Tails `peers` for deletes from other servers and removes them from
/// this server's device and in-memory index. A delete for a key this
/// server has never heard of is a silent no-op, matching the original.
pub async fn run_delete_consumer(
    db: Database,
    index: std::sync::Arc<PeerIndex>,
    device: std::sync::Arc<DeviceController>,
) -> Result<(), FatalError> {
    let collection = db.collection::<bson::Document>("peers");
    let pipeline = [doc! { "$match": { "operationType": "delete" } }];
    let mut stream = collection
        .watch(pipeline, None)
        .await
        .map_err(|e| FatalError::ChangeStream { stream: "peers.delete", source: e })?;

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| FatalError::ChangeStream { stream: "peers.delete", source: e })?;
        let Some(document_key) = event.document_key else { continue };
        let Some(id) = document_key.get_str("_id").ok() else { continue };

        let Some(peer) = index.get(id) else { continue };

        match wireguard_control::Key::from_base64(&peer.public_key) {
            Ok(key) => device.remove(&key)?,
            Err(e) => {
                log::error!("peer {}: invalid public key: {e}", peer.name);
                index.remove(id);
                continue;
            },
        }

        index.remove(id);
        log::info!("peer {} removed", peer.name);
    }

    Ok(())
}

use bson::doc;
use futures_util::StreamExt;
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use mongodb::Database;

use crate::db::PeerCollection;
use crate::device::DeviceController;
use crate::error::FatalError;
use crate::index::PeerIndex;
use crate::model::ServerSpecificInfo;

/// Tails `peers` for inserts from other servers and installs them on
/// this server's device. Restart-safe: resumes from the change
/// stream's own resume token, and simply re-installing a peer this
/// server already knows about is a no-op, so a missed restart window
/// self-heals on the next full-index rebuild rather than needing
/// special-cased recovery here.
pub async fn run_insert_consumer(
    db: Database,
    index: std::sync::Arc<PeerIndex>,
    device: std::sync::Arc<DeviceController>,
    peers: PeerCollection,
    public_address: String,
) -> Result<(), FatalError> {
    let collection = db.collection::<crate::model::Peer>("peers");
    let pipeline = [doc! { "$match": { "operationType": "insert" } }];
    let options = ChangeStreamOptions::builder()
        .full_document(Some(FullDocumentType::Default))
        .build();
    let mut stream = collection
        .watch(pipeline, options)
        .await
        .map_err(|e| FatalError::ChangeStream { stream: "peers.insert", source: e })?;

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| FatalError::ChangeStream { stream: "peers.insert", source: e })?;
        let Some(peer) = event.full_document else { continue };

        if index.get(&peer.public_key).is_some() {
            continue;
        }

        let public_key = match wireguard_control::Key::from_base64(&peer.public_key) {
            Ok(key) => key,
            Err(e) => {
                log::error!("peer {}: invalid public key: {e}", peer.name);
                continue;
            },
        };

        device.install(&public_key, &peer.allowed_ips)?;

        index.insert(peer.clone());
        log::info!("peer {} created", peer.name);

        let ssi = ServerSpecificInfo {
            address: public_address.clone(),
            last_handshake_time: String::new(),
            endpoint: String::new(),
            current_tx: 0,
            current_rx: 0,
        };
        match bson::to_bson(&ssi) {
            Ok(ssi_bson) => {
                if let Err(e) = peers.push_ssi(&peer.public_key, ssi_bson).await {
                    log::error!("peer {}: failed to record server-specific info: {e}", peer.name);
                }
            },
            Err(e) => log::error!("peer {}: failed to encode server-specific info: {e}", peer.name),
        }
    }

    Ok(())
}

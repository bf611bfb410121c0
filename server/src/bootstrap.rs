use std::path::Path;

use crate::config::Config;
use crate::db::PeerCollection;
use crate::device::DeviceController;
use crate::error::ServerError;
use crate::index::PeerIndex;
use crate::ip_allocator::{next_unassigned, IpAddress};
use crate::model::{Peer, Role, ServerSpecificInfo};

const ADMIN_NAME: &str = "Admin-0";
const ONE_YEAR_MS: i64 = 365 * 24 * 60 * 60 * 1000;
const ADMIN_QUOTA_BYTES: i64 = 1_024_000_000_000;

/// If the `peers` collection is empty, creates the fleet's first peer
/// (`Admin-0`) and writes its WireGuard client config to disk. Returns
/// `Ok(None)` when peers already exist, so the caller's normal
/// full-resync path runs unchanged.
pub async fn bootstrap_if_empty(
    config: &Config,
    peers: &PeerCollection,
    device: &DeviceController,
    config_dir: &Path,
) -> Result<Option<Peer>, ServerError> {
    if !peers.list_all().await?.is_empty() {
        return Ok(None);
    }

    let keypair = wireguard_control::KeyPair::generate();
    let base: IpAddress = config.interface_address.parse()?;
    let taken = device.taken_allowed_ips().unwrap_or_default();
    let address = next_unassigned(base, &taken)?;

    let admin = Peer {
        public_key: keypair.public.to_base64(),
        role: Role::Admin,
        name: ADMIN_NAME.to_string(),
        preferred_endpoint: String::new(),
        allowed_ips: address.to_slash_32(),
        private_key: keypair.private.to_base64(),
        disabled: false,
        allowed_usage: ADMIN_QUOTA_BYTES,
        expires_at: chrono::Utc::now().timestamp_millis() + ONE_YEAR_MS,
        total_tx: 0,
        total_rx: 0,
        group_id: None,
        telegram_chat_id: None,
        server_specific_info: vec![ServerSpecificInfo {
            address: config.public_address.clone(),
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

    peers.insert(&admin).await?;
    device.install(&keypair.public, &admin.allowed_ips)?;
    write_client_config(config, &admin, &keypair, config_dir)?;

    log::info!("bootstrapped {} with address {}", ADMIN_NAME, admin.allowed_ips);
    Ok(Some(admin))
}

fn write_client_config(
    config: &Config,
    admin: &Peer,
    keypair: &wireguard_control::KeyPair,
    config_dir: &Path,
) -> Result<(), ServerError> {
    let contents = format!(
        "[Interface]\nPrivateKey={}\nAddress={}\nDNS=1.1.1.1,8.8.8.8\n[Peer]\nPublicKey={}\nAllowedIPs=0.0.0.0/0\nEndpoint={}\n",
        admin.private_key,
        admin.allowed_ips,
        keypair.public.to_base64(),
        config.public_endpoint(),
    );
    std::fs::create_dir_all(config_dir)?;
    let path = config_dir.join(format!("{ADMIN_NAME}.conf"));
    std::fs::write(&path, contents)?;
    log::info!("saved config to {}", path.display());
    Ok(())
}

/// Rebuilds the in-memory index from the database and pushes the full
/// peer set onto the device, replacing whatever the kernel already
/// had. Run once at startup after `bootstrap_if_empty`, so a restarted
/// server never trusts stale kernel state over the database.
pub async fn resync_from_database(
    peers: &PeerCollection,
    device: &DeviceController,
    public_address: &str,
) -> Result<PeerIndex, ServerError> {
    let all_peers = peers.list_all().await?;
    let mut device_peers = Vec::with_capacity(all_peers.len());

    for peer in &all_peers {
        let key = wireguard_control::Key::from_base64(&peer.public_key)
            .map_err(|_| ServerError::InvalidQuery(format!("peer {} has an invalid public key", peer.name)))?;
        device_peers.push((key, peer.allowed_ips.clone(), peer.disabled));

        if !peer.server_specific_info.iter().any(|ssi| ssi.address == public_address) {
            let ssi = ServerSpecificInfo {
                address: public_address.to_string(),
                last_handshake_time: String::new(),
                endpoint: String::new(),
                current_tx: 0,
                current_rx: 0,
            };
            peers.push_ssi(&peer.public_key, bson::to_bson(&ssi)?).await?;
        }
    }

    device.replace_peers(&device_peers)?;
    log::info!("{} peers added to wireguard interface", device_peers.len());
    Ok(PeerIndex::from_peers(all_peers))
}

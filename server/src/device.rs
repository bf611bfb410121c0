use std::net::SocketAddr;
use std::time::SystemTime;

use wireguard_control::{
    Backend, Device, DeviceUpdate, InterfaceName, Key, PeerConfigBuilder,
};

use crate::error::ServerError;

/// A single peer's live counters and endpoint, read straight off the
/// kernel device. Distinct from `model::ServerSpecificInfo`: this is
/// what the device reports *right now*, independent of anything
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct PeerSnapshot {
    pub public_key: String,
    pub endpoint: Option<SocketAddr>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub last_handshake_time: Option<SystemTime>,
}

/// Thin wrapper over `wireguard_control::Device`/`DeviceUpdate`. Every
/// mutation here leaves fields it wasn't asked to touch alone — the
/// underlying crate only replaces a peer's allowed IPs when
/// `.replace_allowed_ips()` is called, so "update the endpoint" and
/// "suspend/resume via preshared key" never disturb a peer's address.
pub struct DeviceController {
    interface: InterfaceName,
    backend: Backend,
}

impl DeviceController {
    pub fn new(interface: InterfaceName, backend: Backend) -> Self {
        Self { interface, backend }
    }

    /// Current device state: every peer's live endpoint and counters.
    pub fn snapshot(&self) -> Result<Vec<PeerSnapshot>, ServerError> {
        let device = Device::get(&self.interface, self.backend)?;
        Ok(device
            .peers
            .into_iter()
            .map(|info| PeerSnapshot {
                public_key: info.config.public_key.to_base64(),
                endpoint: info.config.endpoint,
                rx_bytes: info.stats.rx_bytes,
                tx_bytes: info.stats.tx_bytes,
                last_handshake_time: info.stats.last_handshake_time,
            })
            .collect())
    }

    /// `/32`s already assigned to some peer on the live device, used by
    /// the address allocator so a newly issued address can never
    /// collide with one already routed.
    pub fn taken_allowed_ips(&self) -> Result<Vec<String>, ServerError> {
        let device = Device::get(&self.interface, self.backend)?;
        Ok(device
            .peers
            .iter()
            .flat_map(|info| info.config.allowed_ips.iter())
            .map(|ip| format!("{}/{}", ip.address, ip.cidr))
            .collect())
    }

    /// Installs a brand new peer with its full `/32`, no preshared key.
    pub fn install(&self, public_key: &Key, allowed_ip: &str) -> Result<(), ServerError> {
        let builder = PeerConfigBuilder::new(public_key)
            .replace_allowed_ips()
            .add_allowed_ip(
                allowed_ip
                    .split('/')
                    .next()
                    .unwrap_or(allowed_ip)
                    .parse()
                    .map_err(|_| ServerError::InvalidQuery(format!("bad allowed ip {allowed_ip}")))?,
                32,
            );
        DeviceUpdate::new().add_peer(builder).apply(&self.interface, self.backend)?;
        Ok(())
    }

    pub fn remove(&self, public_key: &Key) -> Result<(), ServerError> {
        DeviceUpdate::new()
            .remove_peer_by_key(public_key)
            .apply(&self.interface, self.backend)?;
        Ok(())
    }

    /// Re-points a peer's allowed endpoint without touching its allowed
    /// IPs or suspension state.
    pub fn update_endpoint(&self, public_key: &Key, endpoint: SocketAddr) -> Result<(), ServerError> {
        let builder = PeerConfigBuilder::new(public_key).set_endpoint(endpoint);
        DeviceUpdate::new().add_peer(builder).apply(&self.interface, self.backend)?;
        Ok(())
    }

    /// Suspends a peer by setting an unrelated preshared key it doesn't
    /// know, so its existing session desyncs without removing it from
    /// the interface or touching its allowed IPs. Resuming clears it.
    pub fn set_suspended(&self, public_key: &Key, suspended: bool) -> Result<(), ServerError> {
        let builder = if suspended {
            PeerConfigBuilder::new(public_key).set_preshared_key(wireguard_control::Key::generate_preshared())
        } else {
            PeerConfigBuilder::new(public_key).unset_preshared_key()
        };
        DeviceUpdate::new().add_peer(builder).apply(&self.interface, self.backend)?;
        Ok(())
    }

    /// Full resync: replaces every peer on the device with exactly this
    /// set. Used on startup to recover from a restart without trusting
    /// whatever the kernel happened to retain. A peer whose `disabled`
    /// is `true` is loaded back in its suspended state (a fresh
    /// preshared key it doesn't know), so a restart can never silently
    /// un-suspend someone over quota or expired.
    pub fn replace_peers(&self, peers: &[(Key, String, bool)]) -> Result<(), ServerError> {
        let mut update = DeviceUpdate::new().replace_peers();
        for (public_key, allowed_ip, disabled) in peers {
            let addr = allowed_ip
                .split('/')
                .next()
                .unwrap_or(allowed_ip)
                .parse()
                .map_err(|_| ServerError::InvalidQuery(format!("bad allowed ip {allowed_ip}")))?;
            let mut builder = PeerConfigBuilder::new(public_key)
                .replace_allowed_ips()
                .add_allowed_ip(addr, 32);
            if *disabled {
                builder = builder.set_preshared_key(wireguard_control::Key::generate_preshared());
            }
            update = update.add_peer(builder);
        }
        update.apply(&self.interface, self.backend)?;
        Ok(())
    }

    /// Ensures the interface exists with a keypair and listen port,
    /// creating it if necessary.
    pub fn bring_up(&self, private_key: Key, listen_port: u16) -> Result<(), ServerError> {
        DeviceUpdate::new()
            .set_private_key(private_key)
            .set_listen_port(listen_port)
            .apply(&self.interface, self.backend)?;
        Ok(())
    }
}

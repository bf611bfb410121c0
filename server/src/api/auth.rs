use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ServerError;
use crate::model::Peer;
use crate::Engine;

/// Identifies the calling peer by its source IP, matched against
/// `allowedIPs`, mirroring the original's `Auth` middleware (`ip ==
/// peer's /32`). Every handler downstream reads the caller's role and
/// name off the request extensions instead of re-deriving them.
pub async fn identify_peer<B>(
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    axum::extract::State(engine): axum::extract::State<Engine>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, ServerError> {
    let allowed_ip = format!("{}/32", remote.ip());
    let peer = engine.index.get_by_allowed_ip(&allowed_ip).ok_or(ServerError::Unauthorized)?;
    request.extensions_mut().insert(peer);
    Ok(next.run(request).await)
}

/// `true` if `candidate`'s name shares the prefix up to the first `-`
/// with `actor`'s, the original's group-scoping rule for
/// non-admin/distributor visibility (`strings.Split(peer.Name, "-")[0]`).
pub fn shares_name_group(actor: &Peer, candidate: &Peer) -> bool {
    let prefix = actor.name.split('-').next().unwrap_or(&actor.name);
    candidate.name.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn peer(name: &str) -> Peer {
        Peer {
            public_key: name.into(),
            role: Role::Distributor,
            name: name.into(),
            preferred_endpoint: String::new(),
            allowed_ips: "10.0.0.1/32".into(),
            private_key: String::new(),
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
    fn shares_prefix_up_to_first_dash() {
        let distributor = peer("acme-dist");
        assert!(shares_name_group(&distributor, &peer("acme-user1")));
        assert!(!shares_name_group(&distributor, &peer("other-user1")));
    }
}

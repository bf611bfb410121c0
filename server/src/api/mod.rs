pub mod auth;
mod groups;
mod misc;
mod peers;

use axum::routing::get;
use axum::Router;

use crate::Engine;

/// Builds the full HTTP surface. A thin collaborator over the Peer
/// Index and group collection — every mutation here also goes through
/// the same device/index/database paths the reconciliation loops use,
/// so a request and a change-stream event converge the same way.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/api/peers", get(peers::list_peers).post(peers::create_peer))
        .route(
            "/api/peers/:id",
            get(peers::get_peer)
                .delete(peers::delete_peer)
                .patch(peers::patch_peer)
                .put(peers::reset_peer_usage),
        )
        .route("/api/groups", get(groups::list_groups).post(groups::create_group))
        .route("/api/groups/:id", get(groups::get_group).delete(groups::delete_group))
        .route(
            "/api/groups/:group_id/:peer_id",
            axum::routing::put(groups::add_peer_to_group).delete(groups::remove_peer_from_group),
        )
        .route("/api/me", get(misc::get_me))
        .route("/api/config", get(misc::get_config))
        .route("/api/logs", get(misc::get_logs))
        .route_layer(axum::middleware::from_fn_with_state(engine.clone(), auth::identify_peer))
        .with_state(engine)
}

pub mod api;
pub mod bootstrap;
pub mod changestream;
pub mod config;
pub mod db;
pub mod device;
pub mod error;
pub mod index;
pub mod ip_allocator;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod service;

pub use error::ServerError;

use std::sync::Arc;

use mongodb::Database;
use parking_lot::RwLock;

use crate::{config::Config, device::DeviceController, index::PeerIndex};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a worker or HTTP handler needs. Replaces the teacher's
/// package-level globals (`peers`, `config`, `wgc`, `device`, ...in
/// `server/src/main.rs`) with a single value constructed at boot and
/// cloned (cheaply, via `Arc`) into every task.
#[derive(Clone)]
pub struct Engine {
    pub config: Arc<Config>,
    pub db: Database,
    pub index: Arc<PeerIndex>,
    pub device: Arc<DeviceController>,
    /// The set of other fleet servers' public addresses this server has
    /// ever seen telemetry for, cached for the `/api/config` endpoint.
    pub endpoints: Arc<RwLock<Vec<String>>>,
}

impl Engine {
    pub fn new(
        config: Config,
        db: Database,
        index: Arc<PeerIndex>,
        device: Arc<DeviceController>,
    ) -> Self {
        let endpoints = config.endpoints.clone();
        Self {
            config: Arc::new(config),
            db,
            index,
            device,
            endpoints: Arc::new(RwLock::new(endpoints)),
        }
    }
}

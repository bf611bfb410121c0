use axum::extract::{Extension, State};
use axum::Json;
use serde::Serialize;

use crate::db::LogCollection;
use crate::error::ServerError;
use crate::model::{LogRecord, Peer};
use crate::Engine;

pub async fn get_me(Extension(actor): Extension<Peer>) -> Json<Peer> {
    Json(actor)
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub interface_name: String,
    pub public_address: String,
    pub is_main_server: bool,
    pub endpoints: Vec<String>,
}

pub async fn get_config(State(engine): State<Engine>) -> Json<ConfigView> {
    Json(ConfigView {
        interface_name: engine.config.interface_name.clone(),
        public_address: engine.config.public_address.clone(),
        is_main_server: engine.config.is_main_server,
        endpoints: engine.endpoints.read().clone(),
    })
}

pub async fn get_logs(State(engine): State<Engine>) -> Result<Json<Vec<LogRecord>>, ServerError> {
    let logs = LogCollection::new(&engine.db).recent(200).await?;
    Ok(Json(logs))
}

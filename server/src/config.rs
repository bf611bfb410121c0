use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/wgfleet")
}

/// On-disk shape of the config file, loaded with `toml`. Field names
/// are kebab-case on disk, matching the teacher's `ConfigFile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    pub mongo_uri: String,
    pub db_name: String,
    pub interface_name: String,
    pub interface_address: String,
    pub interface_cidr: u8,
    pub public_address: String,
    pub listen_port: u16,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub telegram_bot_id: Option<String>,
    #[serde(default)]
    pub is_main_server: bool,
}

/// Runtime config: the parsed file plus the path it came from, so
/// `reset-ssis`/`--install` can be told where to look without
/// re-deriving defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub db_name: String,
    pub interface_name: String,
    pub interface_address: String,
    pub interface_cidr: u8,
    pub public_address: String,
    pub listen_port: u16,
    pub endpoints: Vec<String>,
    pub telegram_bot_id: Option<String>,
    pub is_main_server: bool,
    pub path: PathBuf,
}

impl Config {
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|e| {
            ServerError::InvalidQuery(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Self {
            mongo_uri: file.mongo_uri,
            db_name: file.db_name,
            interface_name: file.interface_name,
            interface_address: file.interface_address,
            interface_cidr: file.interface_cidr,
            public_address: file.public_address,
            listen_port: file.listen_port,
            endpoints: file.endpoints,
            telegram_bot_id: file.telegram_bot_id,
            is_main_server: file.is_main_server,
            path: path.to_owned(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), ServerError> {
        let file = ConfigFile {
            mongo_uri: self.mongo_uri.clone(),
            db_name: self.db_name.clone(),
            interface_name: self.interface_name.clone(),
            interface_address: self.interface_address.clone(),
            interface_cidr: self.interface_cidr,
            public_address: self.public_address.clone(),
            listen_port: self.listen_port,
            endpoints: self.endpoints.clone(),
            telegram_bot_id: self.telegram_bot_id.clone(),
            is_main_server: self.is_main_server,
        };
        let rendered = toml::to_string_pretty(&file)
            .map_err(|e| ServerError::InvalidQuery(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, rendered)?;
        Ok(())
    }

    /// `host:port` form used as the WireGuard client config's `Endpoint`.
    pub fn public_endpoint(&self) -> String {
        format!("{}:{}", self.public_address, self.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            mongo_uri: "mongodb://localhost:27017".into(),
            db_name: "wgfleet".into(),
            interface_name: "wg0".into(),
            interface_address: "10.10.0.1".into(),
            interface_cidr: 16,
            public_address: "vpn.example.com".into(),
            listen_port: 51820,
            endpoints: vec!["10.1.0.1".into()],
            telegram_bot_id: None,
            is_main_server: true,
            path: path.clone(),
        };
        config.write(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.db_name, "wgfleet");
        assert_eq!(loaded.public_endpoint(), "vpn.example.com:51820");
    }
}

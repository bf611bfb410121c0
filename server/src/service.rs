use std::path::Path;

use mongodb::bson::doc;

use crate::db::PeerCollection;
use crate::error::ServerError;

const UNIT_PATH: &str = "/etc/systemd/system/wgfleetd.service";

fn unit_contents(binary: &Path, config_path: &Path) -> String {
    format!(
        "[Unit]\nDescription=wgfleet reconciliation server\nAfter=network.target\n\n[Service]\nExecStart={} --config {}\nRestart=on-failure\nRestartSec=5\n\n[Install]\nWantedBy=multi-user.target\n",
        binary.display(),
        config_path.display(),
    )
}

/// Writes a systemd unit for this binary and enables it, the Rust
/// equivalent of the original's `goSystemd`-backed `--install` flag.
pub fn install(config_path: &Path) -> Result<(), ServerError> {
    let binary = std::env::current_exe()?;
    std::fs::write(UNIT_PATH, unit_contents(&binary, config_path))?;
    run_systemctl(&["daemon-reload"])?;
    run_systemctl(&["enable", "--now", "wgfleetd"])?;
    log::info!("installed and started wgfleetd.service");
    Ok(())
}

pub fn uninstall() -> Result<(), ServerError> {
    run_systemctl(&["disable", "--now", "wgfleetd"]).ok();
    if Path::new(UNIT_PATH).exists() {
        std::fs::remove_file(UNIT_PATH)?;
    }
    run_systemctl(&["daemon-reload"])?;
    log::info!("uninstalled wgfleetd.service");
    Ok(())
}

fn run_systemctl(args: &[&str]) -> Result<(), ServerError> {
    let status = std::process::Command::new("systemctl").args(args).status()?;
    if !status.success() {
        return Err(ServerError::InvalidQuery(format!("systemctl {args:?} exited with {status}")));
    }
    Ok(())
}

/// Empties `serverSpecificInfo` on every peer, used to force every
/// server in the fleet to re-record its telemetry from scratch (e.g.
/// after renumbering the fleet's server addresses).
pub async fn reset_server_specific_info(peers: &PeerCollection) -> Result<(), ServerError> {
    let mut count = 0;
    for peer in peers.list_all().await? {
        peers
            .set_fields(&peer.public_key, doc! { "serverSpecificInfo": [] })
            .await?;
        count += 1;
    }
    log::info!("cleared server-specific info for {count} peers");
    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use wgfleet_server::config::Config;
use wgfleet_server::db::{GroupCollection, PeerCollection};
use wgfleet_server::device::DeviceController;
use wgfleet_server::{api, bootstrap, changestream, db, logging, reconcile, service, Engine};

#[derive(Debug, Parser)]
#[command(name = "wgfleetd", author, version, about)]
struct Opts {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the reconciliation server (the default when no subcommand is given).
    Serve,

    /// Empty `serverSpecificInfo` on every peer, then exit.
    ResetSsis,

    /// Register wgfleetd as a systemd service and start it.
    Install,

    /// Remove wgfleetd's systemd service.
    Uninstall,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    match opts.command.unwrap_or(Command::Serve) {
        Command::Install => {
            pretty_env_logger::init();
            service::install(&opts.config)?;
            return Ok(());
        },
        Command::Uninstall => {
            pretty_env_logger::init();
            service::uninstall()?;
            return Ok(());
        },
        Command::ResetSsis => {
            pretty_env_logger::init();
            let config = Config::load(&opts.config)?;
            let db = db::connect(&config.mongo_uri, &config.db_name).await?;
            service::reset_server_specific_info(&PeerCollection::new(&db)).await?;
            return Ok(());
        },
        Command::Serve => {},
    }

    serve(opts.config).await
}

async fn serve(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load(&config_path)?;
    let db = db::connect(&config.mongo_uri, &config.db_name).await?;
    db::ensure_indexes(&db).await?;

    let logs = db::LogCollection::new(&db);
    logging::MongoTeeLogger::init(
        log::Level::Info,
        tokio::runtime::Handle::current(),
        logs,
        config.public_address.clone(),
    )?;

    log::info!("wgfleetd {} starting", wgfleet_server::VERSION);

    let backend = wireguard_control::Backend::default();
    let interface: wireguard_control::InterfaceName = config
        .interface_name
        .parse()
        .map_err(|e: wireguard_control::InvalidInterfaceName| anyhow::anyhow!(e.to_string()))?;
    let device = DeviceController::new(interface, backend);

    let private_key = wireguard_control::Key::generate_private();
    device.bring_up(private_key, config.listen_port)?;

    let peers = PeerCollection::new(&db);
    let groups = GroupCollection::new(&db);

    let config_dir = config_path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    bootstrap::bootstrap_if_empty(&config, &peers, &device, &config_dir).await?;

    let index = Arc::new(bootstrap::resync_from_database(&peers, &device, &config.public_address).await?);
    let device = Arc::new(device);

    log::info!("server started");

    let engine = Engine::new(config.clone(), db.clone(), index.clone(), device.clone());

    spawn_background_tasks(&engine, peers, groups);

    let app = api::router(engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], 443));
    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

/// Spawns the peer loop (always), the group loop (main server only),
/// and the three change-stream consumers. Each task logs and exits its
/// own loop on a fatal error; the process relies on the init system
/// (or `--install`'s `Restart=on-failure` unit) to restart it rather
/// than trying to recover reconciliation state in-process.
fn spawn_background_tasks(engine: &Engine, peers: PeerCollection, groups: GroupCollection) {
    tokio::spawn(reconcile::run_peer_loop(
        engine.index.clone(),
        engine.device.clone(),
        peers.clone(),
        groups.clone(),
        engine.config.public_address.clone(),
    ));

    if engine.config.is_main_server {
        tokio::spawn(supervise("group loop", reconcile::run_group_loop(groups.clone(), peers.clone())));
    }

    tokio::spawn(supervise("peers.delete", {
        let db = engine.db.clone();
        let index = engine.index.clone();
        let device = engine.device.clone();
        changestream::run_delete_consumer(db, index, device)
    }));

    tokio::spawn(supervise("peers.insert", {
        let db = engine.db.clone();
        let index = engine.index.clone();
        let device = engine.device.clone();
        let peers = peers.clone();
        let public_address = engine.config.public_address.clone();
        changestream::run_insert_consumer(db, index, device, peers, public_address)
    }));

    tokio::spawn(supervise("peers.update", {
        let db = engine.db.clone();
        let index = engine.index.clone();
        let device = engine.device.clone();
        let public_address = engine.config.public_address.clone();
        changestream::run_update_consumer(db, index, device, public_address)
    }));
}

/// A change-stream consumer or the group loop exiting is always a
/// fatal condition: there is no way to know what changed while a
/// consumer wasn't watching, and an unrecoverable database error in
/// the group loop means its cascades can no longer be trusted. Rather
/// than attempt to resume silently, log loudly and let the process
/// exit so the init system restarts it into a full resync.
async fn supervise(name: &str, task: impl std::future::Future<Output = Result<(), wgfleet_server::error::FatalError>>) {
    if let Err(e) = task.await {
        log::error!("{name} failed: {e}");
        std::process::exit(1);
    }
}

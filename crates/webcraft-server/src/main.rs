mod config;
mod connection;
mod console;
mod permissions;
mod player;
mod server_chunk;
mod server_chunk_manager;
mod world;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use config::ServerConfig;
use connection::ServerEvent;
use console::ConsoleOutcome;
use permissions::AdminList;
use webcraft_resource_pack::load_all_packs;
use webcraft_world::block_registry::BlockRegistry;
use webcraft_world::generator::create_generator;
use webcraft_world::storage::{LevelDbStore, WorldInfo, WorldStore};
use world::{ServerWorld, WorldOptions};

fn fatal(msg: impl std::fmt::Display) -> ! {
    error!("{msg}");
    eprintln!("{msg}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let config = Arc::new(match ServerConfig::load("server.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load server.toml: {e}");
            std::process::exit(1);
        }
    });

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "Webcraft Server v{} starting on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.address,
        config.server.port
    );
    info!("Max players: {}", config.server.max_players);
    info!(
        "World: {} (generator: {}, seed: {})",
        config.world.name, config.world.generator, config.world.seed
    );

    let chunk_size = config.world.chunk_size().unwrap_or_else(|e| fatal(e));

    let packs = load_all_packs(Path::new(&config.packs.directory))
        .unwrap_or_else(|e| fatal(format!("Failed to load resource packs: {e}")));
    let registry = Arc::new(
        BlockRegistry::from_packs(&packs)
            .unwrap_or_else(|e| fatal(format!("Failed to build block registry: {e}"))),
    );
    info!(
        "Loaded {} resource packs, {} blocks (max id {})",
        packs.len(),
        registry.len(),
        registry.max_id()
    );

    let generator = create_generator(&config.world.generator, &registry)
        .unwrap_or_else(|e| fatal(format!("Failed to create generator: {e}")));

    let mut store = LevelDbStore::open(Path::new(&config.world.database))
        .unwrap_or_else(|e| fatal(format!("Failed to open world database: {e}")));
    let info = match store.get_world(&config.world.guid) {
        Ok(Some(info)) => info,
        Ok(None) => {
            let info = WorldInfo {
                guid: config.world.guid.clone(),
                name: config.world.name.clone(),
                seed: config.world.seed.clone(),
                generator: config.world.generator.clone(),
                spawn: Default::default(),
            };
            if let Err(e) = store.save_world(&info) {
                fatal(format!("Failed to create world record: {e}"));
            }
            info!("Created world {}", info.guid);
            info
        }
        Err(e) => fatal(format!("Failed to read world record: {e}")),
    };
    if info.generator != config.world.generator {
        warn!(
            "World {} was created with generator {}, config says {}",
            info.guid, info.generator, config.world.generator
        );
    }

    let admins = AdminList::load(&config.permissions.admins_file);
    let options = WorldOptions {
        chunk_size,
        chunk_transfer: config.world.chunk_transfer,
        min_chunk_y: config.world.min_chunk_y,
    };
    let mut world = ServerWorld::init(
        info,
        registry,
        generator,
        Box::new(store),
        admins,
        options,
    )
    .unwrap_or_else(|e| fatal(format!("Failed to initialize world: {e}")));

    let bind = format!("{}:{}", config.server.address, config.server.port);
    let listener = TcpListener::bind(&bind)
        .await
        .unwrap_or_else(|e| fatal(format!("Failed to bind {bind}: {e}")));
    info!("Listening on {bind}");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Handle Ctrl+C
    let shutdown_tx_ctrlc = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx_ctrlc.send(true);
    });

    let (events_tx, mut events) = tokio::sync::mpsc::channel::<ServerEvent>(256);
    tokio::spawn(connection::serve(
        listener,
        events_tx,
        config.server.max_players as usize,
        shutdown_rx.clone(),
    ));

    // Console REPL: read lines from stdin
    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut shutdown_rx = shutdown_rx;
    let mut tick_interval = tokio::time::interval(Duration::from_millis(50));
    let auto_save = config.world.auto_save_interval;
    let mut save_interval = tokio::time::interval(Duration::from_secs(auto_save.max(1)));
    save_interval.tick().await;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(ServerEvent::Join { id, username, tx }) => world.on_player(id, username, tx),
                    Some(ServerEvent::Packets { id, packets }) => world.handle_packets(id, packets).await,
                    Some(ServerEvent::Leave { id }) => world.on_leave(id),
                    None => break,
                }
            }
            _ = tick_interval.tick() => {
                world.tick();
            }
            Some(line) = console_rx.recv() => {
                match console::handle_command(&mut world, &line) {
                    ConsoleOutcome::Reply(reply) => info!("{reply}"),
                    ConsoleOutcome::Stop => {
                        let _ = shutdown_tx.send(true);
                    }
                }
            }
            _ = save_interval.tick(), if auto_save > 0 => {
                if let Err(e) = world.save() {
                    warn!("Auto-save failed: {e}");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Saving world before shutdown...");
                    if let Err(e) = world.save() {
                        error!("Final save failed: {e}");
                    }
                    break;
                }
            }
        }
    }
    info!("Server shut down.");
}

//! Pinboard server binary.

use clap::Parser;
use pinboard_server::{
    MemoryStorage, RedbStorage, ServerArgs, ServerDriver, ServerError, Storage, SystemEnv, serve,
    spawn_driver,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();

    match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("pinboard.redb");
            tracing::info!(path = %path.display(), "opening redb storage");
            run(&args, RedbStorage::open(&path)?).await
        },
        None => {
            tracing::info!("using in-memory storage");
            run(&args, MemoryStorage::new()).await
        },
    }
}

async fn run<S: Storage>(args: &ServerArgs, storage: S) -> Result<(), ServerError> {
    let config = args.driver_config();
    tracing::info!(
        concurrency = ?config.concurrency,
        broadcast = ?config.broadcast,
        attempts = config.apply_attempts,
        "starting driver"
    );

    let handle = spawn_driver(ServerDriver::new(SystemEnv, storage, config));
    let listener = TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    serve(listener, handle).await
}

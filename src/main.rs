use clap::Parser;
use miette::{IntoDiagnostic, Result};
use orderflow::application::Services;
use orderflow::config::Cli;
use orderflow::domain::ports::{SharedOrderStore, SharedPaymentStore};
use orderflow::infrastructure::in_memory::{
    InMemoryOrderStore, InMemoryPaymentSettingsStore, InMemoryPaymentStore,
};
use orderflow::interfaces::http::create_router;
use orderflow::interfaces::json::order_reader::OrderReader;
use std::fs::File;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let (orders, payments) = open_stores(&cli)?;
    let settings = InMemoryPaymentSettingsStore::with_defaults(
        cli.default_payment_settings().into_diagnostic()?,
    );
    let services = Services::new(orders, payments, Arc::new(settings), cli.strict);

    if let Some(path) = &cli.orders {
        import_orders(&services, File::open(path).into_diagnostic()?).await?;
    }

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .into_diagnostic()?;
    info!(bind = %cli.bind, strict = cli.strict, "Order service listening");
    axum::serve(listener, create_router(services))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(cli: &Cli) -> Result<(SharedOrderStore, SharedPaymentStore)> {
    if let Some(db_path) = &cli.db_path {
        let store =
            orderflow::infrastructure::rocksdb::RocksDBStore::open(db_path).into_diagnostic()?;
        info!(path = %db_path.display(), "Using RocksDB storage");
        let orders: SharedOrderStore = Arc::new(store.clone());
        let payments: SharedPaymentStore = Arc::new(store);
        return Ok((orders, payments));
    }
    Ok(in_memory_stores())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(cli: &Cli) -> Result<(SharedOrderStore, SharedPaymentStore)> {
    if cli.db_path.is_some() {
        warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature \
            is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (SharedOrderStore, SharedPaymentStore) {
    let orders: SharedOrderStore = Arc::new(InMemoryOrderStore::new());
    let payments: SharedPaymentStore = Arc::new(InMemoryPaymentStore::new());
    (orders, payments)
}

async fn import_orders(services: &Services, file: File) -> Result<()> {
    let mut imported = 0usize;
    for order in OrderReader::new(file).orders() {
        match order {
            Ok(order) => match services.orders.insert(order).await {
                Ok(()) => imported += 1,
                Err(e) => warn!(error = %e, "Error importing order"),
            },
            Err(e) => warn!(error = %e, "Error reading order"),
        }
    }
    info!(imported, "Imported orders");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use stickpool::{list_devices, DevicePool};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// Thin diagnostic wrapper around the library: list devices, monitor the
// described ones, and log the merged snapshot until interrupted.
#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let description_paths: Vec<String> = std::env::args().skip(1).collect();
    if description_paths.is_empty() {
        return Err(eyre!("usage: stickpool <description.toml> [more.toml ...]"));
    }

    for item in list_devices() {
        info!(
            "Found {} at {} ({:04x}:{:04x})",
            item.name,
            item.path.display(),
            item.vendor_id,
            item.product_id
        );
    }

    let pool = DevicePool::new(&description_paths, 0.05)
        .map_err(|e| eyre!("Failed to build device pool: {}", e))?;
    let devices = pool.reset().await;
    info!("Monitoring {} device(s): {:?}", devices.len(), devices);

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for (name, state) in pool.fetch_nowait() {
                    info!(
                        "{}: {} axes, {} buttons, {} hats",
                        name,
                        state.axes.len(),
                        state.buttons.len(),
                        state.hats.len()
                    );
                }
            }
        }
    }

    info!("Shutting down");
    pool.stop().await;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .pretty()
        .init();
    Ok(())
}

//! Log ingestion server
//!
//! Runs logpulse with the REST API enabled and shuts down cleanly on
//! SIGINT/SIGTERM.
//!
//! Configuration is read from `PulseConfig.toml` (working directory, then
//! `$HOME`); without one the built-in defaults are used and results are only
//! logged.
//!
//! After starting, you can:
//! - Upload a log via POST http://localhost:8080/log/file
//! - Follow jobs via GET http://localhost:8080/jobs
//! - Stream events via GET http://localhost:8080/events
//! - View Swagger UI at http://localhost:8080/swagger-ui
//!
//! ```bash
//! RUST_LOG=logpulse=debug cargo run --example log_server
//! ```

use logpulse::{Config, Event, LogPulse, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logpulse=info")),
        )
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Using default configuration");
            Config::default()
        }
    };
    let bind_address = config.server.api.bind_address;

    let pulse = LogPulse::new(config).await?;

    let mut events = pulse.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Accepted {
                    id, cache_target, ..
                } => println!("✓ Accepted job #{} -> {}", id, cache_target),
                Event::Complete { id, lines, records } => {
                    println!("✓ Job #{} complete: {} lines, {} records", id, lines, records)
                }
                Event::Failed { id, error } => println!("✗ Job #{} failed: {}", id, error),
                Event::CleanupFailed { id, path, .. } => {
                    println!("⚠ Job #{} left {} behind", id, path.display())
                }
                _ => {}
            }
        }
    });

    let _api = pulse.spawn_api_server();

    println!("🚀 logpulse listening on http://{}", bind_address);
    println!();
    println!("Example commands:");
    println!("  curl -F email=ops@example.com -F file=@access.log http://{}/log/file", bind_address);
    println!("  curl http://{}/jobs", bind_address);
    println!("  curl -N http://{}/events", bind_address);

    run_with_shutdown(pulse).await?;

    Ok(())
}

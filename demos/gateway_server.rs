//! REST API gateway example
//!
//! Runs media-dl with the REST API enabled. Pass a JSON config file as the
//! first argument to override the defaults; `RUST_LOG` controls log output.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Submit jobs via POST http://localhost:6790/api/v1/jobs
//! - Download results via GET http://localhost:6790/api/v1/jobs/{id}/file
//! - Stream events via GET http://localhost:6790/api/v1/events

use media_dl::{Config, MediaGateway, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("media_dl=info,tower_http=info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let base = format!("http://{}", config.api.bind_address);

    let gateway = MediaGateway::new(config).await?;
    let server = gateway.spawn_api_server();

    println!("media-dl gateway");
    println!("  Swagger UI:    {}/swagger-ui", base);
    println!("  API base:      {}/api/v1", base);
    println!("  Events stream: {}/api/v1/events", base);
    println!();
    println!("Example commands:");
    println!("  # Submit a 1080p video job");
    println!("  curl -X POST {}/api/v1/jobs \\", base);
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"url\": \"https://example.com/watch?v=1\", \"kind\": \"video\", \"quality\": \"1080p\"}}'");
    println!();
    println!("  # Fetch the result once it has succeeded");
    println!("  curl -OJ {}/api/v1/jobs/1/file", base);

    run_with_shutdown(gateway).await?;
    server.abort();

    Ok(())
}

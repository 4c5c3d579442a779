//! Serve command handler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use zunda_axum::{ServerConfig, bootstrap, start_server};

use crate::bootstrap::CliContext;

/// Start the server and block until Ctrl-C.
pub async fn execute(
    ctx: &CliContext,
    host: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> Result<()> {
    let mut settings = ctx.settings.clone();
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.http_port = port;
    }
    if let Some(dir) = static_dir {
        settings.server.static_dir = Some(dir);
    }

    let config = ServerConfig::from_settings(&settings.server);
    let stage = bootstrap(settings)?;

    println!();
    println!("  zunda-stage server starting...");
    println!();
    println!("  Presentation: ws://{}/ws/presentation", config.address());
    println!("  Control:      ws://{}/ws/control", config.address());
    println!("  API:          http://{}/api", config.address());
    if let Some(dir) = &config.static_dir {
        println!("  Page:         http://{}/ (from {})", config.address(), dir.display());
    }
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    start_server(Arc::new(stage), config).await
}

//! `portage-server` — accepts connections from `portage` clients and serves
//! copy requests against the local filesystem. Grounded in `mycpserver`.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use portage::dispatch;
use portage::net::server::ServerEndpoint;
use portage::password;

#[derive(Parser)]
#[command(name = "portage-server")]
#[command(about = "Serve copy requests from portage clients")]
struct Cli {
    /// Address to listen on, e.g. "0.0.0.0:9000".
    #[arg(long)]
    listen: String,
    /// Shared secret clients must use. If omitted, one is generated and logged.
    #[arg(long)]
    password: Option<String>,
    /// File to read (or, if missing, write) the generated password from/to.
    #[arg(long, default_value = "portage_password.txt")]
    password_file: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let app_config = portage::config::Config::load();

    let secret = match cli.password {
        Some(password) => password,
        None => {
            let password = password::load_or_generate(&cli.password_file)
                .context("loading or generating password")?;
            log::info!("using password: {password}");
            password
        }
    };
    let secret = Arc::new(secret);
    let max_file_size = app_config.max_file_size;
    let wrong_password_threshold = app_config.wrong_password_threshold;
    let wrong_password = Arc::new(AtomicU64::new(0));

    log::info!("listening on {}", cli.listen);
    let server = ServerEndpoint::bind(&cli.listen, app_config.net_config(), move |body: &[u8]| {
        let secret = Arc::clone(&secret);
        let wrong_password = Arc::clone(&wrong_password);
        dispatch::handle(
            body,
            secret.as_bytes(),
            max_file_size,
            &wrong_password,
            wrong_password_threshold,
        )
    })
    .await
    .with_context(|| format!("binding {}", cli.listen))?;

    tokio::signal::ctrl_c().await.ok();
    log::info!("shutting down");
    server.close();
    Ok(())
}

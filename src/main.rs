use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sftp_drive::known_hosts::HostKeyPolicy;
use sftp_drive::{ActivityLog, Config, Connector, routes};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // info by default, overridable through RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::from_env_config()?;
    if !cfg.require_https {
        warn!("require_https is off: credentials may cross the network in clear text");
    }
    if cfg.host_key_policy == HostKeyPolicy::AcceptAny {
        warn!("host_key_policy is accept_any: SSH host keys are not verified");
    }

    let connector: Arc<dyn Connector> = Arc::new(cfg.connector()?);
    let connector = Data::from(connector);
    let activity = Data::new(ActivityLog::new(&cfg.activity_log_path));
    let max_upload = cfg.max_upload_size;
    let listen_addr = cfg.listen.clone();
    let cfg = Data::new(cfg);

    info!(
        "Starting server at {listen_addr}, activity log at {}",
        activity.path().display()
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(cfg.clone())
            .app_data(connector.clone())
            .app_data(activity.clone())
            .app_data(web::JsonConfig::default().limit(max_upload))
            .app_data(web::FormConfig::default().limit(64 * 1024))
            .configure(routes::configure)
    })
    .bind(listen_addr)?
    .run()
    .await?;
    Ok(())
}

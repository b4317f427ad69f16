#[macro_use]
extern crate tracing;

mod api;
mod auth;
mod config;
mod dispatch;
mod error;
mod installer;
mod jobs;
mod models;
mod operation;
mod path;
mod pipeline;
mod startup;
mod state;
mod workers;

use config::server_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  let config = server_config();
  logger::init(&config.log)?;

  info!("cnab-arm-rp version: v{}", env!("CARGO_PKG_VERSION"));

  startup::run().await?;

  let listener =
    tokio::net::TcpListener::bind(("0.0.0.0", config.listener_port)).await?;
  info!("listening on :{}", config.listener_port);

  let mut term_signal =
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

  tokio::select! {
    res = axum::serve(listener, api::app()) => res?,
    _ = term_signal.recv() => {
      info!("received SIGTERM, shutting down");
    },
  }

  Ok(())
}

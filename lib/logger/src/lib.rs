use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioLogMode {
  Standard,
  Json,
  None,
}

impl Default for StdioLogMode {
  fn default() -> Self {
    StdioLogMode::Standard
  }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
  pub level: tracing::Level,
  pub stdio: StdioLogMode,
  pub pretty: bool,
  pub ansi: bool,
  /// Include module path/target in standard-mode lines. Off by
  /// default, it's rarely useful outside debugging the pipeline
  /// itself.
  pub location: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: tracing::Level::INFO,
      stdio: StdioLogMode::Standard,
      pretty: false,
      ansi: true,
      location: false,
    }
  }
}

pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let registry =
    Registry::default().with(LevelFilter::from(config.level));

  match (config.stdio, config.pretty) {
    (StdioLogMode::Standard, true) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .pretty()
          .with_file(false)
          .with_line_number(false)
          .with_target(config.location)
          .with_ansi(config.ansi),
      )
      .try_init(),
    (StdioLogMode::Standard, false) => registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_file(false)
          .with_line_number(false)
          .with_target(config.location)
          .with_ansi(config.ansi),
      )
      .try_init(),
    (StdioLogMode::Json, _) => {
      registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    }
    (StdioLogMode::None, _) => Ok(()),
  }
  .context("failed to init logger")
}

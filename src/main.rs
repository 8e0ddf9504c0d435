use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

use inboxsync::app::App;
use inboxsync::config::Config;
use inboxsync::logging;
use inboxsync::sync::SyncClient;

#[derive(Parser, Debug)]
#[command(name = "inboxsync")]
#[command(about = "A shell for your tasks and inbox with instant, optimistic updates")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/inboxsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Directory for log files (default: $XDG_DATA_HOME/inboxsync/logs)
  #[arg(long)]
  log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _log_guard = match args.log_dir.or_else(logging::default_log_dir) {
    Some(dir) => Some(logging::init(&dir)?),
    None => None,
  };

  let config = Config::load(args.config.as_deref())?;
  info!(url = %config.api.url, "starting");

  let client = SyncClient::from_config(&config)?;
  let mut app = App::new(client);
  app.run().await?;

  Ok(())
}

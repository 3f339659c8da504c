//! `run-plugins`: the BotBot plugin runner process.
//!
//! Reads JSON packets from stdin and writes `WRITE` commands to stdout.
//!
//! ```bash
//! run-plugins --config botbot.toml --runtime current-thread
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use botbot_runtime::{ConfigLoader, PluginRunner, logging};
use clap::{Parser, ValueEnum};
use tracing::info;

/// Scheduler the handlers run on.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum RuntimeFlavor {
    /// Tokio thread pool.
    #[default]
    MultiThread,
    /// One thread, handlers interleaved cooperatively.
    CurrentThread,
}

/// BotBot plugin runner
#[derive(Parser, Debug)]
#[command(name = "run-plugins")]
#[command(about = "Routes IRC lines from the bot process to BotBot plugins")]
#[command(version)]
struct Args {
    /// Configuration file (default: search botbot.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Configuration profile, selects botbot.{profile}.toml
    #[arg(long, value_name = "NAME", env = "BOTBOT_PROFILE")]
    profile: Option<String>,

    /// Concurrency backend for handler tasks
    #[arg(long, value_enum, default_value_t = RuntimeFlavor::MultiThread)]
    runtime: RuntimeFlavor,
}

impl Args {
    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(profile) = &self.profile {
            loader = loader.profile(profile);
        }
        match &self.config {
            Some(path) => loader.file(path),
            None => loader,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = args.loader().load().context("Failed to load configuration")?;
    logging::init_from_config(&config.logging).context("Failed to initialize logging")?;

    let runtime = match args.runtime {
        RuntimeFlavor::MultiThread => tokio::runtime::Builder::new_multi_thread(),
        RuntimeFlavor::CurrentThread => tokio::runtime::Builder::new_current_thread(),
    }
    .enable_all()
    .build()
    .context("Failed to build tokio runtime")?;

    info!(runtime = ?args.runtime, "Starting plugin runner");

    runtime.block_on(async move {
        let runner = PluginRunner::from_config(&config)
            .await
            .context("Failed to start plugin runner")?
            .reload_from(move || args.loader().load());
        runner.run().await.context("Plugin runner failed")?;
        Ok::<_, anyhow::Error>(())
    })
}

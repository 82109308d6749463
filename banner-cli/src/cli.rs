use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use banner_core::{
    Config,
    pipeline::{fetch_stage, render_stage},
    render::DEFAULT_TEMPLATE,
    source_from_config,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "banner", version, about = "XEMA weather banner generator")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also append log lines to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every configured station and overwrite the snapshot.
    Fetch {
        /// Do not append to the per-station history even if enabled.
        #[arg(long)]
        no_history: bool,
    },

    /// Render the latest snapshot into the banner HTML.
    Render {
        /// Render a "no data" banner when the snapshot file does not exist.
        #[arg(long)]
        allow_missing_snapshot: bool,
    },

    /// Run the render stage (and optionally fetch first) as subprocesses.
    Run {
        /// Fetch before rendering.
        #[arg(long)]
        fetch: bool,
    },

    /// List the configured stations.
    Stations,

    /// Write a default config file and starter template.
    Configure {
        /// Overwrite an existing config file without asking.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        match self.command {
            Command::Fetch { no_history } => {
                let config = Config::load(self.config.as_deref())?;
                let source = source_from_config(&config.source)?;

                fetch_stage(&config, source.as_ref(), !no_history)
                    .await
                    .context("Fetch stage failed")?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Render { allow_missing_snapshot } => {
                let config = Config::load(self.config.as_deref())?;

                render_stage(&config, allow_missing_snapshot, Utc::now())
                    .context("Render stage failed")?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Run { fetch } => {
                let mut stages = Vec::new();
                if fetch {
                    stages.push("fetch");
                }
                stages.push("render");

                for stage in stages {
                    let code =
                        run_stage(self.config.as_ref(), self.log_file.as_ref(), stage).await?;
                    if code != 0 {
                        error!("Stage '{stage}' failed with exit code {code}");
                        return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1).max(1)));
                    }
                    info!("Stage '{stage}' finished successfully");
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Stations => {
                let config = Config::load(self.config.as_deref())?;

                println!("Stations: {}", config.stations.len());
                for (i, station) in config.stations.iter().enumerate() {
                    println!("  {:2}. {} - {}", i + 1, station.code, station.display_name);
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::Configure { force } => {
                configure(self.config, force)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

/// Re-invoke this executable for one stage and return its exit code.
async fn run_stage(
    config: Option<&PathBuf>,
    log_file: Option<&PathBuf>,
    stage: &str,
) -> Result<i32> {
    let exe = std::env::current_exe().context("Could not locate the banner executable")?;

    let mut cmd = tokio::process::Command::new(&exe);
    if let Some(path) = config {
        cmd.arg("--config").arg(path);
    }
    if let Some(path) = log_file {
        cmd.arg("--log-file").arg(path);
    }
    cmd.arg(stage);

    info!("Running stage '{stage}'");
    let status = cmd
        .status()
        .await
        .with_context(|| format!("Failed to start stage '{stage}'"))?;

    // Killed by a signal: no code, report as a plain failure.
    Ok(status.code().unwrap_or(1))
}

fn configure(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => Config::config_file_path()?,
    };

    if path.exists() && !force {
        let overwrite = inquire::Confirm::new(&format!(
            "Config file {} already exists. Overwrite it with defaults?",
            path.display()
        ))
        .with_default(false)
        .prompt()
        .context("Confirmation prompt failed")?;

        if !overwrite {
            info!("Config left unchanged: {}", path.display());
            return Ok(());
        }
    }

    let config = Config::default();
    config.save(&path)?;
    println!("Config written to {}", path.display());

    let template = &config.paths.template;
    if template.exists() {
        println!("Template already present at {}", template.display());
    } else {
        if let Some(parent) = template.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(template, DEFAULT_TEMPLATE)
            .with_context(|| format!("Failed to write template: {}", template.display()))?;
        println!("Starter template written to {}", template.display());
    }

    Ok(())
}

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use anyhow::Context;
use droid_pilot::config::PlannerConfig;
use droid_pilot::device::{self, AndroidDevice};
use droid_pilot::dispatch::{DispatchConfig, Dispatcher};
use droid_pilot::hierarchy::Index;
use droid_pilot::planner::{CaptureSummary, ChatPlanner, Planner};
use droid_pilot::retry::{self, RetryPolicy};

#[derive(Parser)]
#[command(name = "droid-pilot")]
#[command(version = "0.1.0")]
#[command(about = "Natural-language Android UI automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a natural-language task against a connected device
    Run {
        /// Task description, e.g. "open settings and turn on WLAN"
        #[arg(short, long)]
        task: String,

        /// Device serial (the only connected device if not provided)
        #[arg(short, long)]
        device: Option<String>,

        /// Planner configuration file
        #[arg(short, long, default_value = "config/planner.json")]
        config: PathBuf,

        /// Plan/dispatch cycles before giving up
        #[arg(long, default_value = "10")]
        max_steps: usize,

        /// Directory for per-step dumps and screenshots
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print the parsed UI hierarchy of the current screen
    Dump {
        /// Device serial
        #[arg(short, long)]
        device: Option<String>,
    },

    /// List connected devices
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            task,
            device,
            config,
            max_steps,
            data_dir,
        } => {
            run_task(&task, device, &config, max_steps, data_dir).await?;
        }
        Commands::Dump { device } => {
            let device = AndroidDevice::connect(device)
                .await
                .context("could not connect to device")?;
            let dispatcher = Dispatcher::new(device, DispatchConfig::default());
            let capture = dispatcher.capture().await?;
            let index = Index::build(&capture.root);
            println!(
                "{} {} ({} nodes, {} interactive)",
                "▶".green(),
                capture.app.package.cyan(),
                index.len(),
                index.interactive.len()
            );
            for node in index.interactive_nodes() {
                let label = if !node.text.is_empty() {
                    &node.text
                } else {
                    &node.accessibility_label
                };
                println!(
                    "  {:<40} {:<16} {:?} {}",
                    node.path,
                    node.short_kind(),
                    node.bounds.center(),
                    label
                );
            }
        }
        Commands::Devices => {
            device::list_devices().await?;
        }
    }

    Ok(())
}

async fn run_task(
    task: &str,
    serial: Option<String>,
    config_path: &PathBuf,
    max_steps: usize,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let device = AndroidDevice::connect(serial)
        .await
        .context("could not connect to device")?;
    let planner_config = PlannerConfig::load(config_path);
    if planner_config.api_key.is_empty() {
        anyhow::bail!("no API key: set DROID_PILOT_API_KEY or api_key in the config file");
    }
    let planner = ChatPlanner::new(planner_config).context("could not build planner client")?;

    let dispatch_config = DispatchConfig {
        data_dir,
        ..Default::default()
    };
    let dispatcher = Dispatcher::new(device, dispatch_config);
    let policy = RetryPolicy::default();

    println!("{} Task: {}", "▶".green().bold(), task.cyan());

    for step in 1..=max_steps {
        println!("\n{} Step {}/{}", "▶".green(), step, max_steps);

        let capture = dispatcher
            .capture()
            .await
            .context("could not capture the screen")?;
        let summary = {
            let index = Index::build(&capture.root);
            CaptureSummary::new(&index, &capture.app, capture.screen)
        };

        let actions = retry::invoke(&policy, || planner.plan(task, &summary))
            .await
            .context("planning failed")?;

        if actions.is_empty() {
            println!("\n{} Task complete.", "✓".green().bold());
            return Ok(());
        }

        let outcomes = dispatcher.dispatch_all(&actions).await?;
        if let Some(failed) = outcomes.iter().find(|o| !o.succeeded) {
            println!(
                "{} Step did not fully succeed: {}",
                "⚠".yellow(),
                failed.detail
            );
        }
    }

    anyhow::bail!("task did not finish within {} steps", max_steps)
}

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Command as ProcessCommand;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voidmine::config::SimConfig;
use voidmine::shm::ShmServer;
use voidmine::worker::{self, WorkerOptions};

#[derive(Parser)]
#[command(
    name = "voidmine",
    about = "Distributed cellular-automaton simulation of drilling and void migration"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spawn one coordinator and N worker processes locally and wait for
    /// the run to finish.
    Launch {
        #[command(flatten)]
        sim: SimArgs,
        /// Number of worker processes (one sector each); the coordinator is
        /// one extra process on top of these.
        #[arg(long, default_value_t = 3)]
        workers: usize,
        #[arg(long, default_value = "127.0.0.1:7400")]
        coordinator: SocketAddr,
        #[arg(long, default_value = "127.0.0.1:7401")]
        root: SocketAddr,
        /// Write the merged grid's raw cell bytes here when the run ends.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the shared-memory coordinator process.
    Coordinator {
        #[arg(long)]
        listen: SocketAddr,
        #[arg(long)]
        blocks: usize,
        #[arg(long)]
        block_size: usize,
    },
    /// Run a single worker process.
    Worker {
        #[command(flatten)]
        sim: SimArgs,
        #[arg(long)]
        rank: usize,
        #[arg(long)]
        workers: usize,
        #[arg(long)]
        coordinator: SocketAddr,
        #[arg(long)]
        root: SocketAddr,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Simulation parameters; unset flags fall back to the config file (if
/// given), then to the built-in defaults.
#[derive(Args, Debug)]
struct SimArgs {
    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<i32>,
    #[arg(long)]
    height: Option<i32>,
    #[arg(long)]
    x_res: Option<i32>,
    #[arg(long)]
    y_res: Option<i32>,
    #[arg(long)]
    iterations: Option<u32>,
    #[arg(long)]
    coal_seam_height: Option<i32>,
    #[arg(long)]
    drill_length: Option<i32>,
    #[arg(long)]
    ground_height: Option<i32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    lock_retry_limit: Option<u32>,
    #[arg(long)]
    lock_retry_delay_us: Option<u64>,
}

impl SimArgs {
    fn resolve(&self) -> Result<SimConfig> {
        let mut cfg = match &self.config {
            Some(path) => SimConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(v) = self.width {
            cfg.width = v;
        }
        if let Some(v) = self.height {
            cfg.height = v;
        }
        if let Some(v) = self.x_res {
            cfg.x_res = v;
        }
        if let Some(v) = self.y_res {
            cfg.y_res = v;
        }
        if let Some(v) = self.iterations {
            cfg.iterations = v;
        }
        if let Some(v) = self.coal_seam_height {
            cfg.coal_seam_height = v;
        }
        if let Some(v) = self.drill_length {
            cfg.drill_length = v;
        }
        if let Some(v) = self.ground_height {
            cfg.ground_height = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = Some(v);
        }
        if let Some(v) = self.lock_retry_limit {
            cfg.lock_retry_limit = v;
        }
        if let Some(v) = self.lock_retry_delay_us {
            cfg.lock_retry_delay_us = v;
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "voidmine=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Launch {
            sim,
            workers,
            coordinator,
            root,
            output,
        } => launch(&sim.resolve()?, workers, coordinator, root, output),
        Command::Coordinator {
            listen,
            blocks,
            block_size,
        } => {
            let server = ShmServer::bind(listen, blocks, block_size)?;
            server.run()?;
            Ok(())
        }
        Command::Worker {
            sim,
            rank,
            workers,
            coordinator,
            root,
            output,
        } => {
            let cfg = sim.resolve()?;
            let opts = WorkerOptions {
                rank,
                workers,
                coordinator,
                root,
            };
            if let Some(global) = worker::run(&cfg, &opts)? {
                for (cell, count) in global.census() {
                    info!(cell = ?cell, count, "final census");
                }
                if let Some(path) = output {
                    std::fs::write(&path, global.as_bytes())
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "merged grid written");
                }
            }
            Ok(())
        }
    }
}

/// The mpirun stand-in: spawn the coordinator plus every worker as child
/// processes of this executable and wait for all of them.
fn launch(
    cfg: &SimConfig,
    workers: usize,
    coordinator: SocketAddr,
    root: SocketAddr,
    output: Option<PathBuf>,
) -> Result<()> {
    cfg.validate(workers + 1)?;
    let exe = std::env::current_exe().context("locating current executable")?;

    info!(
        workers,
        %coordinator,
        %root,
        "launching {} processes",
        workers + 1
    );

    let mut children = Vec::with_capacity(workers + 1);
    children.push(
        ProcessCommand::new(&exe)
            .arg("coordinator")
            .args(["--listen", &coordinator.to_string()])
            .args(["--blocks", &(workers - 1).to_string()])
            .args(["--block-size", &cfg.grid_width().to_string()])
            .spawn()
            .context("spawning coordinator")?,
    );

    for rank in 0..workers {
        let mut command = ProcessCommand::new(&exe);
        command
            .arg("worker")
            .args(["--rank", &rank.to_string()])
            .args(["--workers", &workers.to_string()])
            .args(["--coordinator", &coordinator.to_string()])
            .args(["--root", &root.to_string()])
            .args(["--width", &cfg.width.to_string()])
            .args(["--height", &cfg.height.to_string()])
            .args(["--x-res", &cfg.x_res.to_string()])
            .args(["--y-res", &cfg.y_res.to_string()])
            .args(["--iterations", &cfg.iterations.to_string()])
            .args(["--coal-seam-height", &cfg.coal_seam_height.to_string()])
            .args(["--drill-length", &cfg.drill_length.to_string()])
            .args(["--ground-height", &cfg.ground_height.to_string()])
            .args(["--lock-retry-limit", &cfg.lock_retry_limit.to_string()])
            .args(["--lock-retry-delay-us", &cfg.lock_retry_delay_us.to_string()]);
        if let Some(seed) = cfg.seed {
            command.args(["--seed", &seed.to_string()]);
        }
        if rank == 0 {
            if let Some(path) = &output {
                command.arg("--output").arg(path);
            }
        }
        children.push(
            command
                .spawn()
                .with_context(|| format!("spawning worker {rank}"))?,
        );
    }

    let mut failed = false;
    for mut child in children {
        let status = child.wait().context("waiting for child process")?;
        if !status.success() {
            failed = true;
        }
    }
    if failed {
        bail!("one or more processes exited with an error");
    }
    Ok(())
}

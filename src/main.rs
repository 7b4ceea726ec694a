use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rimlevel::core::{RegisterBank, RegisterSpace, RegisterStore, RobotProgram};
use rimlevel::detection::{InspectionRequest, ViewImage};
use rimlevel::{station, telemetry, Config, DebugConfig, StrategyKind};

#[derive(Parser)]
#[command(name = "rimlevel")]
#[command(about = "Check container rims for level before packing")]
struct Cli {
    /// Path to the station config file
    #[arg(long, global = true, value_name = "FILE", default_value = "rimlevel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run detection once on a pair of images and print the flags
    Detect {
        /// Image of the first view
        #[arg(long, value_name = "IMAGE")]
        first: PathBuf,

        /// Image of the second view
        #[arg(long, value_name = "IMAGE")]
        second: PathBuf,

        /// Level tolerance in degrees
        #[arg(long)]
        tolerance: Option<f32>,

        /// Save preprocessing stages to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Drive full inspection cycles against an emulated robot program
    Simulate {
        /// Number of inspection cycles
        #[arg(long, default_value_t = 1)]
        cycles: u32,
    },

    /// Serve the handshake loop until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let args = Cli::parse();
    let cfg = Config::load(&args.config)?;

    match args.command {
        Command::Detect {
            first,
            second,
            tolerance,
            debug_out,
            verbose,
        } => detect(cfg, first, second, tolerance, debug_out, verbose),
        Command::Simulate { cycles } => simulate(cfg, cycles).await,
        Command::Run => run(cfg).await,
    }
}

fn detect(
    mut cfg: Config,
    first: PathBuf,
    second: PathBuf,
    tolerance: Option<f32>,
    debug_out: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    if let Some(tolerance) = tolerance {
        cfg.detection.angle_tolerance_deg = tolerance;
        cfg.validate()?;
    }
    // The one-shot command always measures, whatever the station runs.
    cfg.strategy = StrategyKind::Automated;

    let debug = debug_out.map(DebugConfig::new).transpose()?;
    let strategy = station::build_strategy(&cfg, debug);

    if verbose {
        println!("Tolerance: {:.2} deg", cfg.detection.angle_tolerance_deg);
        println!("First view ({}): {:?}", cfg.views.first.side, first);
        println!("Second view ({}): {:?}\n", cfg.views.second.side, second);
    }

    let request = InspectionRequest {
        session_id: 0,
        views: vec![
            ViewImage {
                side: cfg.views.first.side,
                active_ids: cfg.views.first.canisters.clone(),
                path: Some(first),
            },
            ViewImage {
                side: cfg.views.second.side,
                active_ids: cfg.views.second.canisters.clone(),
                path: Some(second),
            },
        ],
    };
    let flags = strategy.inspect(&request)?;

    println!("=== Rim Level Results ===");
    for id in request.active_ids() {
        match flags.get(&id) {
            Some(true) => println!("  C{}: NEEDS CORRECTION", id),
            Some(false) => println!("  C{}: level", id),
            None => println!("  C{}: not processed", id),
        }
    }
    Ok(())
}

async fn simulate(cfg: Config, cycles: u32) -> anyhow::Result<()> {
    let store = station::build_bank(&cfg);
    let bank: Arc<dyn RegisterBank> = store.clone();
    let mut controller = station::build_controller(&cfg, Arc::clone(&bank), station::build_strategy(&cfg, None));
    let mut robot = RobotProgram::new(bank, cfg.registers.clone());

    let tick = Duration::from_millis(cfg.tick_ms);
    // Generous bound so a stuck cycle cannot hang the command.
    let max_ticks = (cfg.capture_timeout_ms / cfg.tick_ms.max(1)).max(100) * 3;

    for cycle in 1..=cycles {
        robot.restart();
        let mut ticks = 0;
        while !robot.is_finished() {
            if ticks >= max_ticks {
                anyhow::bail!("cycle {} did not finish after {} ticks", cycle, ticks);
            }
            robot.step()?;
            if let Err(e) = controller.tick() {
                tracing::error!(error = %e, "tick failed");
            }
            ticks += 1;
            tokio::time::sleep(tick).await;
        }

        println!("\n=== Cycle {} ===", cycle);
        if let Some(report) = robot.report() {
            println!(
                "session {} version {} flags {:?}",
                report.session_id, report.version, report.flags
            );
        }
        print_dump(&store, &cfg)?;
    }
    Ok(())
}

fn print_dump(store: &RegisterStore, cfg: &Config) -> anyhow::Result<()> {
    for space in [RegisterSpace::Status, RegisterSpace::Control] {
        let regs = store.dump(space, 0, cfg.registers.bank_size)?;
        println!("{} registers:", space);
        for (addr, value) in regs {
            println!("  [{}] = {}", addr, value);
        }
    }
    Ok(())
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let bank = station::build_bank(&cfg);
    let mut controller = station::build_controller(&cfg, bank, station::build_strategy(&cfg, None));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;
    Ok(())
}

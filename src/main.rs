use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use procsim::{BooleanControl, ProcessContext, ProcessId, Queue, Simulation, SimulationConfig};

/// Single-teller bank: customers arrive at random, queue, get served.
#[derive(Parser, Debug)]
#[command(name = "procsim-bank", about = "Single-teller bank queue simulation.")]
struct Cli {
    /// Number of customers to generate
    #[arg(short, long, default_value_t = 20)]
    customers: u32,

    /// Mean time between arrivals
    #[arg(long, default_value_t = 4.0)]
    mean_arrival: f64,

    /// Mean service time
    #[arg(long, default_value_t = 3.0)]
    mean_service: f64,

    /// RNG seed; equal seeds give identical runs
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Path to a TOML simulation config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trace scheduler progress
    #[arg(short, long)]
    verbose: bool,
}

struct Bank {
    teller_free: BooleanControl,
    line: Mutex<Queue<ProcessId>>,
    rng: Mutex<StdRng>,
    served: Mutex<u32>,
    mean_service: f64,
}

impl Bank {
    fn exponential(&self, mean: f64) -> f64 {
        let u: f64 = self.rng.lock().unwrap_or_else(|e| e.into_inner()).random();
        -mean * (1.0 - u).ln()
    }

    fn customer(&self, ctx: &mut ProcessContext) {
        let sim = ctx.simulation();
        self.line
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .place(sim, ctx.id());

        while !self.teller_free.get() {
            ctx.wait(&self.teller_free, true);
        }
        self.teller_free.store(false);

        match self.line.lock().unwrap_or_else(|e| e.into_inner()).get(sim) {
            Ok(front) => tracing::debug!(customer = %front, time = %ctx.now(), "service starts"),
            Err(e) => tracing::warn!(error = %e, "teller found nobody in line"),
        }

        ctx.advance(self.exponential(self.mean_service));
        *self.served.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        self.teller_free.assign(sim, true);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" })),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            SimulationConfig::from_toml_str(&std::fs::read_to_string(path)?)?
        }
        None => SimulationConfig::default(),
    };
    config.verbose |= cli.verbose;

    println!("═══════════════════════════════════════════════════════");
    println!("  procsim — single-teller bank");
    println!("═══════════════════════════════════════════════════════");

    let sim = Simulation::with_config(config);
    let bank = Arc::new(Bank {
        teller_free: BooleanControl::new(true),
        line: Mutex::new(Queue::fifo("teller-line")),
        rng: Mutex::new(StdRng::seed_from_u64(cli.seed)),
        served: Mutex::new(0),
        mean_service: cli.mean_service,
    });

    let arrivals = bank.clone();
    let (customers, mean_arrival) = (cli.customers, cli.mean_arrival);
    sim.register_named("arrivals", 0, move |ctx| {
        for n in 0..customers {
            ctx.advance(arrivals.exponential(mean_arrival));
            let bank = arrivals.clone();
            ctx.simulation()
                .register_named(format!("customer-{n}"), 1, move |ctx| bank.customer(ctx));
        }
    });

    sim.wait_until_done();

    let stats = sim.stats();
    let line = bank.line.lock().unwrap_or_else(|e| e.into_inner());
    println!("  Finished at {}", sim.now());
    println!("  Customers served: {}", *bank.served.lock().unwrap_or_else(|e| e.into_inner()));
    println!("  Dispatches: {}", stats.dispatches);
    println!("  {}", *line);
    Ok(())
}

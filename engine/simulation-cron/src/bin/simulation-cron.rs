use simulation_cron::{Listener, Simulation, SimulationConfig, TickerSpec};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting simulation cron v{}", simulation_cron::VERSION);

    // Load configuration
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SimulationConfig::from_file(&path)?
        }
        None => demo_config(),
    };

    // Every configured ticker logs its ticks
    for ticker in &mut config.cron.tickers {
        if ticker.callback.is_none() {
            let id = ticker.id.clone();
            ticker.callback = Some(Listener::from_fn(move || info!(ticker = %id, "tick")));
        }
    }

    let mut simulation = Simulation::new(config)?;
    if let Err(e) = simulation.init() {
        error!("Simulation failed to start: {}", e);
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;

    simulation.shutdown();
    if let Some(cron) = simulation.cron() {
        info!("Final metrics: {:?}", cron.metrics());
    }

    Ok(())
}

fn demo_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.cron.tickers = vec![
        TickerSpec::new("donkey").every(2, "s").limit(10),
        TickerSpec::new("donkey2").every(3000, "ms").limit(10),
    ];
    config
}

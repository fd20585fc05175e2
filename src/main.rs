use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder;

use pwospf_router::config::{InterfaceConfig, RouterConfig};
use pwospf_router::interfaces::resolve_interfaces;
use pwospf_router::network::PnetLink;
use pwospf_router::worker_pool::WorkerPool;
use pwospf_router::{Router, RouterContext};

#[derive(Parser)]
#[command(name = "pwospf-router", about = "PWOSPF software router")]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interfaces to route between (overrides the configuration file)
    #[arg(long, num_args = 1..)]
    interfaces: Vec<String>,

    #[arg(long)]
    hello_interval: Option<u16>,

    #[arg(long)]
    lsu_interval: Option<u32>,

    /// Dump neighbors, topology and routes every 30 seconds
    #[arg(long)]
    debug: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RouterConfig::load(path)?,
        None => RouterConfig::default(),
    };
    if !cli.interfaces.is_empty() {
        config.interfaces = cli.interfaces.iter().map(InterfaceConfig::named).collect();
    }
    if let Some(hello_interval) = cli.hello_interval {
        config.hello_interval = hello_interval;
    }
    if let Some(lsu_interval) = cli.lsu_interval {
        config.lsu_interval = lsu_interval;
    }
    config.validate()?;

    if let Some(path) = &cli.save_config {
        config.save(path)?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(config, cli.debug))
}

async fn run(config: RouterConfig, debug: bool) -> Result<()> {
    let interfaces = resolve_interfaces(&config.interfaces)?;
    let (link, sources) = PnetLink::open(&interfaces)?;

    let ctx = Arc::new(RouterContext::new(config.timers(), interfaces, Arc::new(link)));
    for route in config.static_routes()? {
        ctx.add_static_route(route).await;
    }

    let pool = WorkerPool::start(ctx.clone(), config.workers, config.queue_depth);
    for source in sources {
        let name = source.interface().to_string();
        source.spawn(pool.submitter())?;
        info!("Listening on {}", name);
    }

    let mut router = Router::new(ctx);
    let router_id = router.start(debug).await;
    info!("Router {} running, press Ctrl-C to stop", router_id);

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to wait for Ctrl-C: {}", e);
    }

    router.shutdown().await;
    pool.shutdown();
    Ok(())
}

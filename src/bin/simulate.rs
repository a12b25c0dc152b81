use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use log::info;
use simple_error::{SimpleError, SimpleResult};
use tokio::{sync::watch, time};
use tracing_subscriber::prelude::*;
use wormsim::{
    params::{self, SimulationParams},
    position_sync::HttpPositionSink,
    session::{self, Session},
    store::{FileWeightStore, HttpWeightStore, WeightStore},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs the organism headless and logs its progress", long_about = None)]
struct Args {
    /// YAML simulation parameters; built-in defaults if omitted
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Weight matrix JSON file, used instead of the weight store URL
    #[arg(short, long)]
    weights_file: Option<PathBuf>,

    /// Base URL of the weight store
    #[arg(long)]
    weights_url: Option<String>,

    /// Base URL of the position sync endpoint
    #[arg(long)]
    position_url: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration_secs: Option<u64>,

    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 5)]
    log_interval_secs: u64,
}

fn load_params(args: &Args) -> SimpleResult<SimulationParams> {
    let mut params = match &args.params {
        Some(path) => params::load_simulation_params(path)?,
        None => SimulationParams::default(),
    };

    if args.seed.is_some() {
        params.technical_params.seed_override = args.seed;
    }
    if args.weights_url.is_some() {
        params.network_params.weight_store_url = args.weights_url.clone();
    }
    if args.position_url.is_some() {
        params.network_params.position_sync_url = args.position_url.clone();
    }

    Ok(params)
}

fn weight_store(args: &Args, params: &SimulationParams) -> SimpleResult<Arc<dyn WeightStore>> {
    if let Some(path) = &args.weights_file {
        return Ok(Arc::new(FileWeightStore::new(path)));
    }

    match &params.network_params.weight_store_url {
        Some(url) => Ok(Arc::new(HttpWeightStore::new(
            url,
            params.network_params.request_timeout(),
        )?)),
        None => Err(SimpleError::new(
            "no weight source, pass --weights-file or --weights-url",
        )),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> SimpleResult<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wormsim=info,simulate=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let params = load_params(&args)?;
    let weight_store = weight_store(&args, &params)?;

    let mut session = Session::new(session::create_simulation(&params)?, weight_store);
    if let Some(url) = &params.network_params.position_sync_url {
        let sink = HttpPositionSink::new(url, params.network_params.request_timeout())?;
        session = session.with_position_sink(Arc::new(sink));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let duration = args.duration_secs.map(Duration::from_secs);

    tokio::spawn(async move {
        match duration {
            Some(duration) => {
                tokio::select! {
                    _ = time::sleep(duration) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
        info!("shutting down");
        let _ = shutdown_tx.send(true);
    });

    let mut frames = session.subscribe();
    let log_interval = Duration::from_secs(args.log_interval_secs.max(1));

    tokio::spawn(async move {
        let mut interval = time::interval(log_interval);

        loop {
            interval.tick().await;
            if frames.has_changed().is_err() {
                break;
            }

            let summary = {
                let frame = frames.borrow_and_update();
                let firing = frame
                    .neurons
                    .iter()
                    .filter(|neuron| neuron.intensity >= 1.0)
                    .count();
                format!(
                    "{:?}, position ({:.1}, {:.1}), drive ({:.2}, {:.2}), {} of {} neurons at threshold, refresh {:?}, sync {:?}",
                    frame.engine_status,
                    frame.locomotion.x,
                    frame.locomotion.y,
                    frame.drive.left,
                    frame.drive.right,
                    firing,
                    frame.neurons.len(),
                    frame.refresh_status,
                    frame.sync_status,
                )
            };
            info!("{}", summary);
        }
    });

    let simulation = session.run(shutdown_rx).await;

    let pose = simulation.pose();
    if let (Some(head), Some(tail)) = (pose.spine.first(), pose.spine.last()) {
        info!(
            "final pose: head ({:.1}, {:.1}), tail ({:.1}, {:.1}), {} limbs",
            head.head.x,
            head.head.y,
            tail.tail.x,
            tail.tail.y,
            pose.limbs.len()
        );
    }

    Ok(())
}

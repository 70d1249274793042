use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc;

use argh::FromArgs;

use squid_forecast::config::Config;
use squid_forecast::delta::{JsonLinesSink, subscriptions};
use squid_forecast::ingest::squid::HttpTransport;
use squid_forecast::logging::{Component, LogLevel, LogSink, Logger};
use squid_forecast::orchestrator::{Orchestrator, OrchestratorOptions};
use squid_forecast::resolver::resolve;
use squid_forecast::service::{self, Event, EventLoop};

#[derive(FromArgs)]
/// SquidSailing forecast adapter: reads delta batches on stdin, writes
/// forecast deltas on stdout
struct Args {
    /// path to the configuration file
    #[argh(option, short = 'c', default = "String::from(\"squid.toml\")")]
    config: String,

    /// append log entries to this file
    #[argh(option)]
    log_file: Option<PathBuf>,

    /// enable debug logging
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn main() {
    let args: Args = argh::from_env();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(default_filter);
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Stderr)
        .init();

    let config = match Config::from_file(&args.config) {
        Ok(c) => c.with_env_api_key(),
        Err(e) => {
            log::error!("Failed to load config from '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };

    let log_file = args.log_file.or_else(|| config.service.log_file.clone());
    let min_level = if args.verbose { LogLevel::Debug } else { LogLevel::Info };
    let logger = Logger::new(min_level, log_file.as_deref());
    logger.info(Component::Config, &format!("Loaded configuration from '{}'", args.config));

    let refresh = config.refresh_interval();
    let resolution = resolve(&config.settings(), &logger);

    let transport = match HttpTransport::new(config.request_timeout()) {
        Ok(t) => t,
        Err(e) => {
            log::error!("Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    for sub in subscriptions(refresh) {
        log::debug!(
            "Subscribing to {} every {:?} ({:?}, min period {:?})",
            sub.path,
            sub.period,
            sub.policy,
            sub.min_period
        );
    }

    let mut orchestrator = Orchestrator::new(
        resolution,
        OrchestratorOptions {
            endpoint: config.service.endpoint.clone(),
            refresh,
        },
        Box::new(transport),
        Box::new(JsonLinesSink::new(io::stdout())),
        Box::new(logger),
    );

    let (tx, rx) = mpsc::channel();

    if let Err(e) = ctrlc::set_handler({
        let tx = tx.clone();
        let alive = orchestrator.liveness();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            alive.store(false, Ordering::SeqCst);
            tx.send(Event::Shutdown).ok();
        }
    }) {
        log::error!("Failed to install Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    service::spawn_line_reader(BufReader::new(io::stdin()), tx);

    orchestrator.start();
    let mut event_loop = EventLoop::new(rx, refresh);
    service::run(&mut orchestrator, &mut event_loop);

    log::info!("Forecast adapter shut down, exiting");
}

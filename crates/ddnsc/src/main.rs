// # ddnsc - Dynamic DNS Daemon
//
// Thin integration layer: parses the command line, loads the JSON
// configuration, wires the host backends into the engine and runs it until
// SIGTERM or SIGINT.
//
// ## Usage
//
// ```bash
// ddnsc --config /etc/ddnsc/config.json
// ddnsc -c ./config.json --verbose
// ```
//
// `RUST_LOG` overrides the log level chosen by `--verbose`.
//
// ## Exit Codes
//
// | code | meaning                                           |
// |------|---------------------------------------------------|
// | 0    | clean shutdown after a signal, --help, --version  |
// | 1    | bad arguments, configuration or driver loading    |
// | 2    | runtime error                                     |

use anyhow::{Context, Result};
use clap::Parser;
use ddnsc_core::driver::DriverManager;
use ddnsc_core::traits::IpSource;
use ddnsc_core::{Backends, Config, DnsResolver, Engine};
use ddnsc_http::ReqwestTransport;
use ddnsc_netif::NetifIpSource;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Dynamic DNS update daemon
#[derive(Debug, Parser)]
#[command(name = "ddnsc", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "./config.json")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let code = if e.use_stderr() {
                DdnsExitCode::ConfigError
            } else {
                DdnsExitCode::CleanShutdown
            };
            let _ = e.print();
            return code.into();
        }
    };

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsc {}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let engine = match start(&cli).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("{:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        match run_daemon(engine).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Load configuration and drivers, then build the engine
async fn start(cli: &Cli) -> Result<Engine> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    info!(
        "Configuration loaded: {} domain(s), {} subdomain(s)",
        config.domains.len(),
        config.total_subdomains()
    );

    let mut drivers = DriverManager::new();
    ddnsc_drivers::register(&mut drivers).context("Failed to register built-in drivers")?;

    for path in config.driver_paths() {
        drivers
            .load(&path)
            .await
            .with_context(|| format!("Failed to load driver {}", path.display()))?;
    }
    info!("Available drivers: {}", drivers.list().join(", "));

    let ip_source = NetifIpSource::new();
    match ip_source.interfaces() {
        Ok(interfaces) => info!("Available interfaces: {}", interfaces.join(", ")),
        Err(e) => warn!("Cannot list interfaces: {}", e),
    }

    let resolver = DnsResolver::from_config(&config.resolver).context("Invalid resolver configuration")?;
    if config.resolver.use_custom_server {
        info!("Using custom DNS server {:?}", resolver.servers());
    } else {
        info!("Using system DNS servers {:?}", resolver.servers());
    }

    let backends = Backends {
        lookup: Arc::new(resolver),
        ip_source: Arc::new(ip_source),
        transport: Arc::new(ReqwestTransport::new()),
    };

    Ok(Engine::new(&config, &drivers, backends)?)
}

/// Run the engine until a shutdown signal arrives
async fn run_daemon(engine: Engine) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signals = wait_for_shutdown()?;

    let token = shutdown.clone();
    tokio::spawn(async move {
        match signals.await {
            Ok(signal) => info!("Received {}, shutting down", signal),
            Err(e) => error!("Signal handling failed: {}, shutting down", e),
        }
        token.cancel();
    });

    engine.run(shutdown).await;
    info!("Shutdown complete");
    Ok(())
}

/// Install SIGTERM and SIGINT handlers
///
/// Installation errors surface right away; the returned future resolves
/// with the name of the first signal received.
#[cfg(unix)]
fn wait_for_shutdown() -> Result<impl Future<Output = Result<&'static str>>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => Ok::<_, anyhow::Error>("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT"),
        }
    })
}

/// Fallback for non-Unix platforms: CTRL-C only
#[cfg(not(unix))]
fn wait_for_shutdown() -> Result<impl Future<Output = Result<&'static str>>> {
    Ok(async {
        tokio::signal::ctrl_c()
            .await
            .map(|()| "SIGINT")
            .context("Failed to wait for CTRL-C")
    })
}

//! Orchestrator
//!
//! The Engine is responsible for:
//! - Validating the configuration against the registered drivers and the
//!   host's interfaces
//! - Building one [`Worker`] per configured domain
//! - Running every worker's scheduling loop until shutdown
//! - Draining in-flight passes before returning
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────┐
//!                       │    Engine    │
//!                       └──────────────┘
//!                              │ one loop per domain
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!   ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!   │ Worker (a)  │     │ Worker (b)  │     │ Worker (c)  │
//!   └─────────────┘     └─────────────┘     └─────────────┘
//!          │ tick              │ tick              │ tick
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!                     ┌─────────────────┐
//!                     │ pass pool       │  (semaphore, `estimated_threads` permits)
//!                     └─────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::driver::DriverManager;
use crate::error::Result;
use crate::worker::{Backends, Worker, WorkerOptions};

/// How long in-flight passes may keep running after shutdown
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Size of the shared pass pool
///
/// Two when there are fewer than two subdomains or hardware threads,
/// otherwise the smaller of the two counts.
pub fn estimated_threads(total_subdomains: usize, hardware_threads: usize) -> usize {
    if total_subdomains < 2 || hardware_threads < 2 {
        2
    } else {
        total_subdomains.min(hardware_threads)
    }
}

fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Runs every domain's worker until shutdown
///
/// ## Lifecycle
///
/// 1. Create with [`Engine::new()`] (validates the configuration)
/// 2. Run with [`Engine::run()`] until the token is cancelled
pub struct Engine {
    workers: Vec<Arc<Worker>>,
    pool_size: usize,
    grace_period: Duration,
}

impl Engine {
    /// Create an engine with the default lookup retry policy
    pub fn new(config: &Config, drivers: &DriverManager, backends: Backends) -> Result<Self> {
        Self::with_options(config, drivers, backends, WorkerOptions::default())
    }

    /// Create an engine
    ///
    /// # Returns
    ///
    /// - `Ok(Engine)`: every domain has a registered driver and every
    ///   configured interface exists
    /// - `Err(Error)`: the configuration is invalid
    pub fn with_options(
        config: &Config,
        drivers: &DriverManager,
        backends: Backends,
        options: WorkerOptions,
    ) -> Result<Self> {
        let interfaces = backends.ip_source.interfaces()?;
        config.validate(&drivers.list(), &interfaces)?;

        let workers = config
            .domains
            .iter()
            .map(|domain| {
                let driver = drivers.get(&domain.driver)?;
                Ok(Arc::new(Worker::new(domain.clone(), driver, backends.clone(), options)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            workers,
            pool_size: estimated_threads(config.total_subdomains(), hardware_threads()),
            grace_period: DEFAULT_GRACE_PERIOD,
        })
    }

    /// Override how long in-flight passes are awaited on shutdown
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Returns once every scheduling loop has stopped and in-flight passes
    /// have finished or the grace period ran out.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting {} worker(s), pass pool size {}",
            self.workers.len(),
            self.pool_size
        );

        let pool = Arc::new(Semaphore::new(self.pool_size));
        let tracker = TaskTracker::new();
        let mut loops = JoinSet::new();

        for worker in &self.workers {
            loops.spawn(Arc::clone(worker).run(Arc::clone(&pool), tracker.clone(), shutdown.clone()));
        }

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                error!("Scheduling loop ended abnormally: {}", e);
            }
        }

        tracker.close();
        if tokio::time::timeout(self.grace_period, tracker.wait()).await.is_err() {
            warn!(
                "{} pass(es) still running after {:?}, abandoning them",
                tracker.len(),
                self.grace_period
            );
        }

        info!("Engine stopped");
    }
}

//! Per-domain update worker
//!
//! A [`Worker`] owns one domain. Its scheduling loop only keeps time: every
//! `update_interval` it hands one pass to the shared pass pool and goes back
//! to sleep until the next tick or shutdown.
//!
//! ## Pass
//!
//! For every subdomain, in order:
//!
//! 1. find the candidate address (interface or URL)
//! 2. unless a forced refresh is due, resolve the published record
//!    (RETRY-classified failures are retried with linear backoff; any other
//!    failure counts as "no record")
//! 3. update iff forced, no record was found, or the record differs
//! 4. build the driver parameters, let the driver describe the request,
//!    execute it and let the driver judge the response
//!
//! A failing subdomain never aborts its siblings.
//!
//! ## Overlap
//!
//! A tick that finds the previous pass for the same domain still running is
//! skipped with a warning.

mod report;

pub use report::{PassReport, SubdomainOutcome, SubdomainReport};

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{DomainConfig, IpSourceKind, RecordType, SubdomainConfig};
use crate::dns::RecordLookup;
use crate::driver::{Driver, DriverParams, DriverRequest};
use crate::error::DnsLookupError;
use crate::retry::{retry, RetryPredicate};
use crate::traits::ip_source::AddressFilter;
use crate::traits::{HttpTransport, IpSource};

/// Retry policy for record lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub max_retries: u32,
    /// Base delay; the n-th retry waits `retry_backoff * n`
    pub retry_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// Host services shared by every worker
#[derive(Clone)]
pub struct Backends {
    pub lookup: Arc<dyn RecordLookup>,
    pub ip_source: Arc<dyn IpSource>,
    pub transport: Arc<dyn HttpTransport>,
}

/// When a forced refresh is due
///
/// With `force_update` enabled, a pass is forced once
/// `counter * update_interval >= force_update`, where `counter` counts the
/// passes since the last forced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub update_interval: u64,
    pub force_update: u64,
}

impl RefreshPolicy {
    pub fn is_due(&self, counter: u64) -> bool {
        self.force_update != 0
            && self.force_update >= self.update_interval
            && counter.saturating_mul(self.update_interval) >= self.force_update
    }
}

/// Parameters handed to the driver for one subdomain
///
/// Host-provided keys only fill in what `driver_param` leaves out.
pub fn driver_params(domain: &str, subdomain: &SubdomainConfig, ip: IpAddr) -> DriverParams {
    let mut params = subdomain.driver_param.clone();
    let defaults = [
        ("domain", domain.to_string()),
        ("subdomain", subdomain.name.clone()),
        ("fqdn", subdomain.fqdn(domain)),
        ("rd_type", subdomain.record_type.as_str().to_string()),
        ("ip_addr", ip.to_string()),
    ];

    for (key, value) in defaults {
        params.entry(key.to_string()).or_insert(value);
    }
    params
}

/// Clears the in-flight flag when the pass ends, however it ends
struct InFlight(Arc<Worker>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

/// Scheduler and update engine for one domain
pub struct Worker {
    domain: DomainConfig,
    driver: Arc<dyn Driver>,
    backends: Backends,
    options: WorkerOptions,
    refresh: RefreshPolicy,
    /// Passes since the last forced refresh
    counter: AtomicU64,
    in_flight: AtomicBool,
}

impl Worker {
    pub fn new(domain: DomainConfig, driver: Arc<dyn Driver>, backends: Backends, options: WorkerOptions) -> Self {
        let refresh = RefreshPolicy {
            update_interval: domain.update_interval,
            force_update: domain.force_update,
        };

        Self {
            domain,
            driver,
            backends,
            options,
            refresh,
            counter: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn domain(&self) -> &DomainConfig {
        &self.domain
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.domain.update_interval)
    }

    /// Run one pass over every subdomain
    pub async fn run_pass(&self) -> PassReport {
        let forced = self.refresh.is_due(self.counter.load(Ordering::Acquire));
        if forced {
            info!("Force update for domain {}", self.domain.name);
            self.counter.store(0, Ordering::Release);
        }

        let mut subdomains = Vec::with_capacity(self.domain.subdomains.len());
        for subdomain in &self.domain.subdomains {
            let fqdn = subdomain.fqdn(&self.domain.name);
            let outcome = self.update_subdomain(subdomain, &fqdn, forced).await;
            subdomains.push(SubdomainReport { fqdn, outcome });
        }

        self.counter.fetch_add(1, Ordering::AcqRel);

        PassReport {
            domain: self.domain.name.clone(),
            forced,
            subdomains,
        }
    }

    /// Scheduling loop; returns once `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, pool: Arc<Semaphore>, tracker: TaskTracker, shutdown: CancellationToken) {
        info!(
            "Worker for {} started ({} subdomains, every {}s, driver {})",
            self.domain.name,
            self.domain.subdomains.len(),
            self.domain.update_interval,
            self.domain.driver
        );

        loop {
            self.tick(&pool, &tracker, &shutdown);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval()) => {}
            }
        }

        info!("Worker for {} stopped", self.domain.name);
    }

    /// Submit one pass to the pool unless the previous one is still running
    fn tick(self: &Arc<Self>, pool: &Arc<Semaphore>, tracker: &TaskTracker, shutdown: &CancellationToken) {
        if shutdown.is_cancelled() {
            return;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                "Previous pass for {} is still running, skipping this tick",
                self.domain.name
            );
            return;
        }

        let guard = InFlight(Arc::clone(self));
        let pool = Arc::clone(pool);
        let shutdown = shutdown.clone();

        tracker.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                permit = pool.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let worker = Arc::clone(&guard.0);
            let domain = worker.domain.name.clone();
            match tokio::spawn(async move { worker.run_pass().await }).await {
                Ok(report) => info!("Pass finished for {}", report),
                Err(e) => error!("Pass for {} aborted: {}", domain, e),
            }
            drop(guard);
        });
    }

    async fn update_subdomain(&self, subdomain: &SubdomainConfig, fqdn: &str, forced: bool) -> SubdomainOutcome {
        let Some(ip) = self.candidate_address(subdomain, fqdn).await else {
            return SubdomainOutcome::NoAddress;
        };
        debug!("Candidate address for {}: {}", fqdn, ip);

        if !forced {
            let records = self.published_records(fqdn, subdomain.record_type).await;
            if records.len() > 1 {
                warn!(
                    "{} resolves to {} records, comparing against the first ({})",
                    fqdn,
                    records.len(),
                    records[0]
                );
            }

            match records.first() {
                Some(record) if record.parse::<IpAddr>().ok() == Some(ip) => {
                    debug!("{} is up to date ({})", fqdn, ip);
                    return SubdomainOutcome::Unchanged { ip };
                }
                Some(record) => info!("{} changed: {} -> {}", fqdn, record, ip),
                None => info!("No record found for {}, updating to {}", fqdn, ip),
            }
        }

        let params = driver_params(&self.domain.name, subdomain, ip);
        if let Err(e) = self.driver.check_required_params(&params) {
            error!("Driver {} rejected the parameters for {}: {}", self.domain.driver, fqdn, e);
            return SubdomainOutcome::DriverFailed(e);
        }

        let request = match self.driver.generate_request(&params).await {
            Ok(request) => request,
            Err(e) => {
                error!("Driver {} failed for {}: {}", self.domain.driver, fqdn, e);
                return SubdomainOutcome::DriverFailed(e);
            }
        };
        debug!("Update request for {}: {}", fqdn, request);

        let body = match self
            .backends
            .transport
            .execute(&request, subdomain.address_family(), subdomain.interface())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                error!("Update request for {} failed: {}", fqdn, e);
                return SubdomainOutcome::TransportFailed {
                    ip,
                    message: e.to_string(),
                };
            }
        };
        debug!("Response for {}: {}", fqdn, body);

        if self.driver.check_response(&body).await {
            info!("Updated {} -> {}", fqdn, ip);
            SubdomainOutcome::Updated { ip }
        } else {
            error!("Provider rejected the update of {} to {}", fqdn, ip);
            SubdomainOutcome::UpdateRejected { ip }
        }
    }

    async fn candidate_address(&self, subdomain: &SubdomainConfig, fqdn: &str) -> Option<IpAddr> {
        let family = subdomain.address_family();

        match subdomain.ip_source {
            IpSourceKind::Interface => {
                let Some(interface) = subdomain.interface() else {
                    error!("{} uses the interface ip source without an interface", fqdn);
                    return None;
                };

                let addresses = match self.backends.ip_source.interface_addresses(interface).await {
                    Ok(addresses) => addresses,
                    Err(e) => {
                        error!("Unable to read addresses of {}: {}", interface, e);
                        return None;
                    }
                };

                let filter = AddressFilter {
                    family,
                    allow_local_link: subdomain.allow_local_link,
                    allow_ula: subdomain.allow_ula,
                };
                let candidate = filter.first(&addresses);
                if candidate.is_none() {
                    warn!(
                        "Interface {} has no usable {:?} address for {} (found {:?})",
                        interface, family, fqdn, addresses
                    );
                }
                candidate
            }
            IpSourceKind::Url => {
                let request = DriverRequest::get(subdomain.ip_source_param.trim());
                let body = match self
                    .backends
                    .transport
                    .execute(&request, family, subdomain.interface())
                    .await
                {
                    Ok(body) => body,
                    Err(e) => {
                        error!("Unable to fetch address for {}: {}", fqdn, e);
                        return None;
                    }
                };

                match body.trim().parse::<IpAddr>() {
                    Ok(ip) if family.matches(&ip) => Some(ip),
                    Ok(ip) => {
                        error!("{} returned {}, which is not a {:?} address", request.url, ip, family);
                        None
                    }
                    Err(_) => {
                        error!("{} did not return an IP address: {:?}", request.url, body.trim());
                        None
                    }
                }
            }
        }
    }

    /// Currently published addresses; empty when none could be found
    async fn published_records(&self, fqdn: &str, record_type: RecordType) -> Vec<String> {
        let retryable: RetryPredicate<'_, DnsLookupError> = &|e| e.is_retryable();
        let lookup = &self.backends.lookup;

        match retry(
            || lookup.lookup(fqdn, record_type),
            self.options.max_retries,
            Some(retryable),
            self.options.retry_backoff,
        )
        .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!("{}, treating as no record", e);
                Vec::new()
            }
        }
    }
}

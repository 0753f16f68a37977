//! Driver registry
//!
//! Drivers are registered once during startup, either as statically linked
//! built-ins ([`DriverManager::register`]) or as external executables
//! ([`DriverManager::load`]). After startup the manager is only read, so
//! lookups need no locking; mutation requires `&mut self`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut manager = DriverManager::new();
//! ddnsc_drivers::register(&mut manager)?;
//! manager.load("/usr/lib/ddnsc/my-provider").await?;
//!
//! let driver = manager.get("cloudflare")?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Driver, ExternalDriver, DRIVER_ABI_VERSION};
use crate::error::DriverLoadError;

/// Outcome of [`DriverManager::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// A new driver was registered under this name
    Loaded(String),
    /// A file with the same base name was loaded before; nothing changed
    AlreadyLoaded,
}

/// Name-indexed set of drivers
#[derive(Default)]
pub struct DriverManager {
    drivers: HashMap<String, Arc<dyn Driver>>,

    /// Base names of the executables loaded so far
    loaded_files: Vec<String>,
}

impl DriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its declared name
    ///
    /// The driver must report [`DRIVER_ABI_VERSION`] and its name must not be
    /// taken yet.
    pub fn register(&mut self, driver: Arc<dyn Driver>) -> Result<(), DriverLoadError> {
        let detail = driver.detail();

        if driver.driver_version() != DRIVER_ABI_VERSION {
            return Err(DriverLoadError::AbiMismatch {
                driver: detail.name,
                found: driver.driver_version().to_string(),
                expected: DRIVER_ABI_VERSION.to_string(),
            });
        }

        if self.drivers.contains_key(&detail.name) {
            return Err(DriverLoadError::DuplicateName(detail.name));
        }

        info!(
            "Registered driver {} {} ({})",
            detail.name, detail.version, detail.description
        );
        self.drivers.insert(detail.name, driver);
        Ok(())
    }

    /// Load the driver executable at `path`
    ///
    /// Loading a file whose base name was already loaded is a no-op that
    /// only logs a warning.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<LoadStatus, DriverLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DriverLoadError::NotFound(path.to_path_buf()));
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if self.loaded_files.contains(&file_name) {
            warn!("Driver {} already loaded, skipping {}", file_name, path.display());
            return Ok(LoadStatus::AlreadyLoaded);
        }

        let driver = ExternalDriver::spawn(path).await?;
        let name = driver.detail().name;
        self.register(Arc::new(driver))?;

        info!("Loaded driver {} from {}", name, path.display());
        self.loaded_files.push(file_name);
        Ok(LoadStatus::Loaded(name))
    }

    /// Look up a driver by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>, DriverLoadError> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DriverLoadError::NotRegistered(name.to_string()))
    }

    /// Names of every registered driver, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl std::fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverManager")
            .field("drivers", &self.list())
            .field("loaded_files", &self.loaded_files)
            .finish()
    }
}

//! Shared state behind every GPU object

use std::fmt;
use std::sync::Arc;

use crate::command::CommandPoolRegistry;
use crate::config::GfxConfig;
use crate::device::{Device, DeviceDriver, DeviceId, DeviceRegistry};
use crate::error::{ErrorDomain, GfxResult};
use crate::memory::MemoryAllocator;

/// Owner of the registered devices, the error domain, the memory allocator
/// and the command pool registry
///
/// Buffers and command buffers keep an `Arc<GfxContext>`, so the context is
/// torn down after the last of them. Dropping it destroys every command pool.
pub struct GfxContext {
    config: GfxConfig,
    errors: Arc<ErrorDomain>,
    devices: Arc<DeviceRegistry>,
    allocator: MemoryAllocator,
    pools: CommandPoolRegistry,
}

impl GfxContext {
    /// Create an empty context
    pub fn new(config: GfxConfig, errors: ErrorDomain) -> Arc<Self> {
        let errors = Arc::new(errors);
        let devices = Arc::new(DeviceRegistry::new(Arc::clone(&errors)));
        let allocator = MemoryAllocator::new(Arc::clone(&devices), Arc::clone(&errors), &config);
        let pools = CommandPoolRegistry::new(Arc::clone(&devices), Arc::clone(&errors), &config);

        log::debug!("Created GPU context with {config:?}");

        Arc::new(Self {
            config,
            errors,
            devices,
            allocator,
            pools,
        })
    }

    /// Register a device and return its id
    ///
    /// Ids are assigned in registration order starting at 0.
    pub fn add_device(&self, driver: Arc<dyn DeviceDriver>) -> DeviceId {
        self.devices.add(driver)
    }

    /// Look up a registered device
    ///
    /// Unknown ids are reported as [`crate::ErrorKind::DeviceNotFound`].
    pub fn device(&self, id: DeviceId) -> GfxResult<Device> {
        self.devices.get(id)
    }

    /// Number of registered devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self, id: DeviceId) -> GfxResult<()> {
        let device = self.device(id)?;
        self.errors.check(device.driver().wait_idle())
    }

    /// Settings shared by every object of this context
    pub fn config(&self) -> &GfxConfig {
        &self.config
    }

    /// Error domain every driver result is reported to
    pub fn errors(&self) -> &ErrorDomain {
        &self.errors
    }

    /// Device memory allocator
    pub fn allocator(&self) -> &MemoryAllocator {
        &self.allocator
    }

    /// Command pools, one per thread and queue family
    pub fn pools(&self) -> &CommandPoolRegistry {
        &self.pools
    }
}

impl Drop for GfxContext {
    fn drop(&mut self) {
        self.pools.destroy_all();
    }
}

impl fmt::Debug for GfxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GfxContext")
            .field("config", &self.config)
            .field("devices", &self.devices.len())
            .field("pools", &self.pools.pool_count())
            .finish_non_exhaustive()
    }
}

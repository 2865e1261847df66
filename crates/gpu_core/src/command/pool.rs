//! Per-thread, per-queue-family command pools

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use ash::vk;

use crate::config::GfxConfig;
use crate::device::{DeviceId, DeviceRegistry};
use crate::error::{ErrorDomain, GfxResult};

/// Command pool owned by a [`CommandPoolRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandPool {
    handle: vk::CommandPool,
    device: DeviceId,
    family: u32,
}

impl CommandPool {
    /// Native pool handle
    pub const fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    /// Device the pool was created on
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Queue family the pool allocates for
    pub const fn family(&self) -> u32 {
        self.family
    }
}

/// Pools and the recording lock of one (device, queue family)
#[derive(Default)]
struct FamilyPools {
    lock: Arc<Mutex<()>>,
    pools: RwLock<HashMap<ThreadId, CommandPool>>,
}

/// Lazily created command pools keyed by device, thread and queue family
///
/// Each pool is created at most once and lives until [`destroy_all`] or until
/// the owning context is dropped. Lookups for different queue families never
/// contend with each other.
///
/// [`destroy_all`]: CommandPoolRegistry::destroy_all
pub struct CommandPoolRegistry {
    devices: Arc<DeviceRegistry>,
    errors: Arc<ErrorDomain>,
    flags: vk::CommandPoolCreateFlags,
    families: RwLock<HashMap<(DeviceId, u32), Arc<FamilyPools>>>,
}

impl CommandPoolRegistry {
    pub(crate) fn new(devices: Arc<DeviceRegistry>, errors: Arc<ErrorDomain>, config: &GfxConfig) -> Self {
        Self {
            devices,
            errors,
            flags: config.command_pool_flags(),
            families: RwLock::new(HashMap::new()),
        }
    }

    fn family(&self, device: DeviceId, family: u32) -> Arc<FamilyPools> {
        if let Some(entry) = self
            .families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(device, family))
        {
            return Arc::clone(entry);
        }

        let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(families.entry((device, family)).or_default())
    }

    /// Pool of `thread` for `family` on `device`, created on first use
    pub fn pool_for(&self, device: DeviceId, thread: ThreadId, family: u32) -> GfxResult<CommandPool> {
        let registered = self.devices.get(device)?;
        let entry = self.family(device, family);

        if let Some(pool) = entry
            .pools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&thread)
        {
            return Ok(*pool);
        }

        let mut pools = entry.pools.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = pools.get(&thread) {
            return Ok(*pool);
        }

        let handle = self
            .errors
            .check(registered.driver().create_command_pool(family, self.flags))?;
        let pool = CommandPool { handle, device, family };
        pools.insert(thread, pool);

        log::debug!("Created command pool {handle:?} for {thread:?}, family {family} on device {device}");
        Ok(pool)
    }

    /// Pool of the calling thread
    pub fn pool_for_current_thread(&self, device: DeviceId, family: u32) -> GfxResult<CommandPool> {
        self.pool_for(device, thread::current().id(), family)
    }

    /// Lock serialising recording on every command buffer of a queue family
    pub fn family_lock(&self, device: DeviceId, family: u32) -> Arc<Mutex<()>> {
        Arc::clone(&self.family(device, family).lock)
    }

    /// Number of live pools
    pub fn pool_count(&self) -> usize {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.pools.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Destroy every pool along with the command buffers allocated from it
    ///
    /// Command buffers still referring to a destroyed pool must not be used
    /// afterwards.
    pub fn destroy_all(&self) {
        let families = std::mem::take(&mut *self.families.write().unwrap_or_else(PoisonError::into_inner));

        for ((device, family), entry) in families {
            let _guard = entry.lock.lock().unwrap_or_else(PoisonError::into_inner);
            let pools = std::mem::take(&mut *entry.pools.write().unwrap_or_else(PoisonError::into_inner));
            let Ok(device) = self.devices.get(device) else {
                continue;
            };
            for pool in pools.into_values() {
                device.driver().destroy_command_pool(pool.handle);
            }
            log::debug!("Destroyed command pools of family {family} on device {}", device.id());
        }
    }
}

impl std::fmt::Debug for CommandPoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPoolRegistry")
            .field("flags", &self.flags)
            .field("pools", &self.pool_count())
            .finish_non_exhaustive()
    }
}

use std::collections::BTreeMap;

use nanoserde::DeJson;

use super::{BufferHandle, Runtime};
use crate::error::{BackendError, ErrorStatus};

/// Configuration of the dummy runtime, the `dummy` object of the planner config
#[derive(Debug, Clone, PartialEq, Eq, DeJson)]
pub struct DummyConfig {
    /// How many bytes the dummy device pretends to have
    pub capacity: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        DummyConfig { capacity: 1024 * 1024 * 1024 * 1024 }
    }
}

/// Runtime that hands out fake addresses and never touches memory.
/// Used for planning without a device and in tests.
#[derive(Debug)]
pub struct DummyRuntime {
    free_bytes: usize,
    next_base: u64,
    buffers: BTreeMap<BufferHandle, usize>,
    allocations: usize,
}

impl DummyRuntime {
    #[must_use]
    pub fn new(config: &DummyConfig) -> DummyRuntime {
        DummyRuntime {
            free_bytes: config.capacity,
            // Nonzero, so that offset 0 is distinguishable from null
            next_base: 0x1000,
            buffers: BTreeMap::new(),
            allocations: 0,
        }
    }

    /// Number of successful allocate calls so far
    #[must_use]
    pub const fn allocations(&self) -> usize {
        self.allocations
    }

    /// Number of buffers allocated and not yet released
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn check_range(
        &self,
        buffer: BufferHandle,
        offset: usize,
        len: usize,
        status: ErrorStatus,
    ) -> Result<(), BackendError> {
        let Some(&bytes) = self.buffers.get(&buffer) else {
            return Err(BackendError { status, context: "Unknown buffer.".into() });
        };
        if offset + len > bytes {
            return Err(BackendError {
                status,
                context: format!("Copy of {len} bytes at {offset} overruns buffer of {bytes} bytes.")
                    .into(),
            });
        }
        Ok(())
    }
}

impl Default for DummyRuntime {
    fn default() -> Self {
        DummyRuntime::new(&DummyConfig::default())
    }
}

impl Runtime for DummyRuntime {
    fn allocate(&mut self, bytes: usize) -> Result<BufferHandle, BackendError> {
        if self.free_bytes >= bytes {
            self.free_bytes -= bytes;
        } else {
            return Err(BackendError {
                status: ErrorStatus::MemoryAllocation,
                context: format!("OOM, {} bytes free.", self.free_bytes).into(),
            });
        }
        let handle = BufferHandle(self.next_base);
        // Keep fake buffers far apart
        self.next_base += (bytes as u64).max(1).next_power_of_two().max(0x1000);
        self.buffers.insert(handle, bytes);
        self.allocations += 1;
        Ok(handle)
    }

    fn release(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        let Some(bytes) = self.buffers.remove(&buffer) else {
            return Err(BackendError {
                status: ErrorStatus::MemoryDeallocation,
                context: format!("Buffer {:#x} was not allocated.", buffer.0).into(),
            });
        };
        self.free_bytes += bytes;
        Ok(())
    }

    fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    fn host_to_pool(
        &mut self,
        src: &[u8],
        dst: BufferHandle,
        offset: usize,
    ) -> Result<(), BackendError> {
        self.check_range(dst, offset, src.len(), ErrorStatus::MemoryCopyH2P)
    }

    fn pool_to_host(
        &mut self,
        src: BufferHandle,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), BackendError> {
        self.check_range(src, offset, dst.len(), ErrorStatus::MemoryCopyP2H)
    }
}

#[test]
fn dummy_runtime_accounts_bytes() {
    let mut rt = DummyRuntime::new(&DummyConfig { capacity: 100 });
    let a = rt.allocate(60).unwrap();
    assert_eq!(rt.free_bytes(), 40);
    assert_eq!(
        rt.allocate(41).unwrap_err().status,
        ErrorStatus::MemoryAllocation
    );
    assert!(rt.host_to_pool(&[0; 60], a, 0).is_ok());
    assert!(rt.host_to_pool(&[0; 8], a, 56).is_err());
    rt.release(a).unwrap();
    assert_eq!(rt.free_bytes(), 100);
    assert!(rt.release(a).is_err());
}

//! Host memory runtime for tenplan.
//!
//! Plan a graph whose arena lives in host memory.
//! ```rust
//! let mut graph = tenplan_cpu::graph();
//! let x = graph.add_tensor([2, 3], tenplan::DType::F32);
//! let _y = graph.add_op(tenplan::OpKind::Unary(tenplan::UOp::Relu), &[x], None)?;
//! graph.data_malloc()?;
//! graph.store(x, &[0; 24])?;
//! # Ok::<(), tenplan::PlanError>(())
//! ```

#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::missing_crate_level_docs)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::bare_urls)]

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    collections::BTreeMap,
};

use tenplan::{BackendError, BufferHandle, ErrorStatus, Graph, PlanConfig, Runtime};

/// Alignment of every host buffer, one cache line
const ALIGNMENT: usize = 64;

/// Create new graph planned into host memory, configured from config file and environment
#[must_use]
pub fn graph() -> Graph {
    Graph::with_config(Box::new(HostRuntime::new()), PlanConfig::load())
}

/// Runtime backed by the global allocator
#[derive(Debug, Default)]
pub struct HostRuntime {
    // 0 is unbounded
    limit: usize,
    allocated: usize,
    buffers: BTreeMap<BufferHandle, Layout>,
}

impl HostRuntime {
    /// Runtime without byte limit
    #[must_use]
    pub fn new() -> HostRuntime {
        HostRuntime::default()
    }

    /// Runtime that refuses to hold more than `limit` bytes at once
    #[must_use]
    pub fn with_limit(limit: usize) -> HostRuntime {
        HostRuntime { limit, allocated: 0, buffers: BTreeMap::new() }
    }

    /// Bytes held by live buffers
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    fn range(
        &self,
        buffer: BufferHandle,
        offset: usize,
        len: usize,
        status: ErrorStatus,
    ) -> Result<*mut u8, BackendError> {
        let Some(layout) = self.buffers.get(&buffer) else {
            return Err(BackendError {
                status,
                context: format!("Buffer {:#x} is not allocated.", buffer.0).into(),
            });
        };
        if offset.checked_add(len).map_or(true, |end| end > layout.size()) {
            return Err(BackendError {
                status,
                context: format!(
                    "Copy of {len} bytes at {offset} overruns buffer of {} bytes.",
                    layout.size()
                )
                .into(),
            });
        }
        // SAFETY: range was checked to lie within the buffer
        Ok(unsafe { (buffer.0 as usize as *mut u8).add(offset) })
    }
}

impl Runtime for HostRuntime {
    fn allocate(&mut self, bytes: usize) -> Result<BufferHandle, BackendError> {
        if self.limit != 0 && self.allocated + bytes > self.limit {
            return Err(BackendError {
                status: ErrorStatus::MemoryAllocation,
                context: format!("OOM, {} bytes free.", self.free_bytes()).into(),
            });
        }
        let layout = Layout::from_size_align(bytes.max(1), ALIGNMENT).map_err(|e| BackendError {
            status: ErrorStatus::MemoryAllocation,
            context: format!("{e}").into(),
        })?;
        // SAFETY: layout has nonzero size
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(BackendError {
                status: ErrorStatus::MemoryAllocation,
                context: format!("Global allocator failed to allocate {bytes} bytes.").into(),
            });
        }
        let handle = BufferHandle(ptr as usize as u64);
        self.buffers.insert(handle, layout);
        self.allocated += layout.size();
        Ok(handle)
    }

    fn release(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        let Some(layout) = self.buffers.remove(&buffer) else {
            return Err(BackendError {
                status: ErrorStatus::MemoryDeallocation,
                context: format!("Buffer {:#x} was not allocated.", buffer.0).into(),
            });
        };
        // SAFETY: buffer was allocated by this runtime with this layout
        unsafe { dealloc(buffer.0 as usize as *mut u8, layout) };
        self.allocated -= layout.size();
        Ok(())
    }

    fn free_bytes(&self) -> usize {
        if self.limit == 0 {
            usize::MAX
        } else {
            self.limit.saturating_sub(self.allocated)
        }
    }

    fn host_to_pool(
        &mut self,
        src: &[u8],
        dst: BufferHandle,
        offset: usize,
    ) -> Result<(), BackendError> {
        let ptr = self.range(dst, offset, src.len(), ErrorStatus::MemoryCopyH2P)?;
        // SAFETY: destination range is inside a live buffer, host slice can not alias it
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, src.len()) };
        Ok(())
    }

    fn pool_to_host(
        &mut self,
        src: BufferHandle,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), BackendError> {
        let ptr = self.range(src, offset, dst.len(), ErrorStatus::MemoryCopyP2H)?;
        // SAFETY: source range is inside a live buffer, host slice can not alias it
        unsafe { std::ptr::copy_nonoverlapping(ptr.cast_const(), dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        for (buffer, layout) in std::mem::take(&mut self.buffers) {
            // SAFETY: buffer was allocated by this runtime with this layout
            unsafe { dealloc(buffer.0 as usize as *mut u8, layout) };
        }
    }
}

#[test]
fn limit_is_enforced() {
    let mut rt = HostRuntime::with_limit(100);
    let a = rt.allocate(64).unwrap();
    assert_eq!(rt.free_bytes(), 36);
    assert_eq!(rt.allocate(37).unwrap_err().status, ErrorStatus::MemoryAllocation);
    rt.release(a).unwrap();
    assert_eq!(rt.allocated(), 0);
    assert!(rt.release(a).is_err());
}

#[test]
fn copies_round_trip() {
    let mut rt = HostRuntime::new();
    let a = rt.allocate(16).unwrap();
    rt.host_to_pool(&[1, 2, 3, 4], a, 8).unwrap();
    let mut out = [0u8; 6];
    rt.pool_to_host(a, 6, &mut out).unwrap();
    assert_eq!(out, [0, 0, 1, 2, 3, 4]);
    assert!(rt.host_to_pool(&[0; 4], a, 13).is_err());
}

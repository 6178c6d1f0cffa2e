//! Offset allocator over one flat arena.
//!
//! Allocations are planned as byte offsets into a zero based address space.
//! The real buffer is requested from the runtime only once, by [`Allocator::materialize`],
//! after every offset is known. After that no more planning is allowed.

use std::collections::BTreeMap;

use crate::{
    config::DebugMask,
    dtype::MAX_SCALAR_SIZE,
    error::PlanError,
    runtime::{BufferHandle, Runtime},
};

#[derive(Debug)]
pub struct Allocator {
    runtime: Box<dyn Runtime>,
    // Bytes currently allocated
    used: usize,
    // Maximum of used
    peak: usize,
    // One past the highest byte ever handed out, size of the arena
    extent: usize,
    // 0 is unbounded
    limit: usize,
    // Offset -> length. No two blocks overlap or touch.
    free_blocks: BTreeMap<usize, usize>,
    alignment: usize,
    buffer: Option<BufferHandle>,
    released: bool,
    debug: DebugMask,
}

impl Allocator {
    #[must_use]
    pub fn new(runtime: Box<dyn Runtime>) -> Allocator {
        Allocator {
            runtime,
            used: 0,
            peak: 0,
            extent: 0,
            limit: 0,
            free_blocks: BTreeMap::new(),
            alignment: MAX_SCALAR_SIZE,
            buffer: None,
            released: false,
            debug: DebugMask(0),
        }
    }

    /// Arena will not grow beyond `limit` bytes, 0 means unbounded
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn set_debug(&mut self, debug: DebugMask) {
        self.debug = debug;
    }

    /// Rounds size up to the alignment
    #[must_use]
    pub const fn aligned_size(&self, size: usize) -> usize {
        size.div_ceil(self.alignment) * self.alignment
    }

    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    #[must_use]
    pub const fn extent(&self) -> usize {
        self.extent
    }

    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        self.buffer.is_some()
    }

    /// Free blocks as (offset, length), ordered by offset
    pub fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.free_blocks.iter().map(|(&o, &l)| (o, l))
    }

    #[must_use]
    pub fn runtime(&self) -> &dyn Runtime {
        self.runtime.as_ref()
    }

    pub fn runtime_mut(&mut self) -> &mut dyn Runtime {
        self.runtime.as_mut()
    }

    /// Returns offset of `size` bytes (rounded up to alignment)
    pub fn alloc(&mut self, size: usize) -> Result<usize, PlanError> {
        if self.buffer.is_some() {
            return Err(PlanError::PostBindAllocation);
        }
        let size = self.aligned_size(size);
        if size == 0 {
            return Ok(self.extent);
        }
        // First fit
        let fit = self.free_blocks.iter().find(|&(_, &len)| len >= size).map(|(&o, &l)| (o, l));
        let offset = if let Some((offset, len)) = fit {
            self.free_blocks.remove(&offset);
            if len > size {
                self.free_blocks.insert(offset + size, len - size);
            }
            offset
        } else {
            // Grow the arena. If the last free block ends at the arena end,
            // start there and grow only by the shortfall.
            let tail = self
                .free_blocks
                .last_key_value()
                .filter(|&(&o, &l)| o + l == self.extent)
                .map(|(&o, &l)| (o, l));
            let (offset, grow) = match tail {
                Some((o, l)) => (o, size - l),
                None => (self.extent, size),
            };
            if self.limit != 0 && self.extent + grow > self.limit {
                return Err(PlanError::AllocationExhausted { size });
            }
            if tail.is_some() {
                self.free_blocks.remove(&offset);
            }
            self.extent += grow;
            offset
        };
        self.used += size;
        self.peak = self.peak.max(self.used);
        if self.debug.mem() {
            println!("Alloc {offset}..{} used {} peak {}", offset + size, self.used, self.peak);
        }
        Ok(offset)
    }

    /// Marks `size` bytes (rounded up to alignment) at `offset` free again.
    /// Touching free blocks on both sides are merged.
    pub fn free(&mut self, offset: usize, size: usize) -> Result<(), PlanError> {
        if self.buffer.is_some() {
            return Err(PlanError::PostBindAllocation);
        }
        let size = self.aligned_size(size);
        if size == 0 {
            return Ok(());
        }
        let end = offset + size;
        if end > self.extent || size > self.used {
            return Err(PlanError::DoubleFree { offset, size });
        }
        let prev = self.free_blocks.range(..offset).next_back().map(|(&o, &l)| (o, l));
        let next = self.free_blocks.range(offset..).next().map(|(&o, &l)| (o, l));
        if let Some((o, l)) = prev {
            if o + l > offset {
                return Err(PlanError::DoubleFree { offset, size });
            }
        }
        if let Some((o, _)) = next {
            if o < end {
                return Err(PlanError::DoubleFree { offset, size });
            }
        }
        let mut start = offset;
        let mut len = size;
        if let Some((o, l)) = prev {
            if o + l == offset {
                start = o;
                len += l;
            }
        }
        if let Some((o, l)) = next {
            if o == end {
                self.free_blocks.remove(&o);
                len += l;
            }
        }
        // When merged with prev this overwrites its entry
        self.free_blocks.insert(start, len);
        self.used -= size;
        if self.debug.mem() {
            println!("Free {offset}..{end} used {}", self.used);
        }
        Ok(())
    }

    /// Requests the arena buffer from the runtime, once.
    /// Repeated calls return the same handle.
    pub fn materialize(&mut self) -> Result<BufferHandle, PlanError> {
        if let Some(buffer) = self.buffer {
            return Ok(buffer);
        }
        let bytes = self.extent;
        let buffer = self
            .runtime
            .allocate(bytes)
            .map_err(|error| PlanError::RuntimeAllocationFailure { bytes, error })?;
        if self.debug.mem() {
            println!("Materialized arena {:#x} of {bytes} bytes", buffer.0);
        }
        self.buffer = Some(buffer);
        Ok(buffer)
    }

    /// Releases the arena buffer, if it was materialized. Safe to call repeatedly.
    pub fn deinitialize(&mut self) -> Result<(), PlanError> {
        if let Some(buffer) = self.buffer {
            if !self.released {
                self.released = true;
                self.runtime.release(buffer)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn info(&self) -> String {
        format!(
            "Used memory: {}, peak memory: {}, arena size: {}, free blocks: {}",
            self.used,
            self.peak,
            self.extent,
            self.free_blocks.len()
        )
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        if let Err(e) = self.deinitialize() {
            if self.debug.mem() {
                println!("Failed to release arena, {e}");
            }
        }
    }
}

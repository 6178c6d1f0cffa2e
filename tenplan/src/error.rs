use std::fmt::Display;

/// Enumeration representing the various errors that can occur while planning a graph.
#[derive(Debug)]
pub enum PlanError {
    /// Orphan tensor, dangling id or duplicate id. This is a construction bug.
    StructuralInvariantViolation(Box<str>),
    /// Operator kind rejected its inputs at construction time
    InvalidOperator {
        /// Operator kind
        op: Box<str>,
        /// What was wrong with the inputs
        reason: Box<str>,
    },
    /// Topological sort could not make progress
    CyclicGraph,
    /// Graph was mutated since the last successful sort
    GraphNotSorted,
    /// Operator could not compute output shapes for its current inputs
    ShapeInferenceFailure {
        /// Guid of the offending operator
        guid: u64,
        /// Why the shapes are incompatible
        reason: Box<str>,
    },
    /// Allocator was used after its buffer was materialized
    PostBindAllocation,
    /// Freed range is not currently allocated
    DoubleFree {
        /// Offset of the freed range
        offset: usize,
        /// Aligned size of the freed range
        size: usize,
    },
    /// Bounded arena can not grow any further
    AllocationExhausted {
        /// Aligned size of the failed request
        size: usize,
    },
    /// Runtime failed to provide the arena buffer
    RuntimeAllocationFailure {
        /// Requested size in bytes
        bytes: usize,
        /// Error reported by the runtime
        error: BackendError,
    },
    /// Tensor has no storage yet, call data_malloc first
    DataNotBound {
        /// Fuid of the tensor
        fuid: u64,
    },
    /// Error returned by runtime outside of arena allocation
    BackendError(BackendError),
}

impl PlanError {
    /// Structural error, with location of the caller appended
    #[track_caller]
    pub fn structural(e: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        let mut e: String = e.into();
        e.push_str(&format!(", {}:{}:{}", location.file(), location.line(), location.column()));
        Self::StructuralInvariantViolation(e.into())
    }

    pub(crate) fn invalid_operator(op: impl Display, reason: impl Into<Box<str>>) -> Self {
        Self::InvalidOperator { op: op.to_string().into(), reason: reason.into() }
    }
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::StructuralInvariantViolation(e) => {
                f.write_fmt(format_args!("Structural invariant violated: {e}"))
            }
            PlanError::InvalidOperator { op, reason } => {
                f.write_fmt(format_args!("Invalid operator {op}: {reason}"))
            }
            PlanError::CyclicGraph => f.write_str("Graph contains a cycle"),
            PlanError::GraphNotSorted => f.write_str("Graph is not topologically sorted"),
            PlanError::ShapeInferenceFailure { guid, reason } => {
                f.write_fmt(format_args!("Shape inference failed for operator {guid}: {reason}"))
            }
            PlanError::PostBindAllocation => {
                f.write_str("Allocator can not be used after its buffer was materialized")
            }
            PlanError::DoubleFree { offset, size } => f.write_fmt(format_args!(
                "Freeing range {offset}..{} which is not allocated",
                offset + size
            )),
            PlanError::AllocationExhausted { size } => {
                f.write_fmt(format_args!("Arena exhausted while allocating {size} bytes"))
            }
            PlanError::RuntimeAllocationFailure { bytes, error } => {
                f.write_fmt(format_args!("Runtime failed to allocate {bytes} bytes, {error}"))
            }
            PlanError::DataNotBound { fuid } => {
                f.write_fmt(format_args!("Tensor {fuid} has no storage bound"))
            }
            PlanError::BackendError(e) => f.write_fmt(format_args!("Runtime {e}")),
        }
    }
}

impl std::error::Error for PlanError {}

impl From<BackendError> for PlanError {
    fn from(value: BackendError) -> Self {
        PlanError::BackendError(value)
    }
}

/// Error returned by runtimes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// What failed
    pub status: ErrorStatus,
    /// Runtime specific details
    pub context: Box<str>,
}

impl Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}: {}", self.status, self.context))
    }
}

impl std::error::Error for BackendError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Failed to allocate memory
    MemoryAllocation,
    /// Failed to deallocate memory
    MemoryDeallocation,
    /// Failed to copy memory to pool
    MemoryCopyH2P,
    /// Failed to copy memory to host
    MemoryCopyP2H,
}

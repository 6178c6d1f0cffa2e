//! Tenplan, compile time planner for tensor dataflow graphs.
//!
//! A [`Graph`] owns tensors and operators. Edges between operators are derived
//! from tensors they share. The planning pipeline is
//! [`Graph::topo_sort`], [`Graph::shape_infer`], [`Graph::optimize`] and finally
//! [`Graph::data_malloc`], which places every tensor into one arena buffer
//! requested from a [`Runtime`].

mod allocator;
mod config;
mod dtype;
mod error;
mod graph;
mod operator;
mod ops;
mod optimizer;
pub mod runtime;
mod shape;
mod slab;
mod tensor;

pub use allocator::Allocator;
pub use config::{DebugMask, PlanConfig};
pub use dtype::DType;
pub use error::{BackendError, ErrorStatus, PlanError};
pub use graph::{Graph, LiveRange};
pub use operator::{OpId, Operator};
pub use ops::{BOp, OpKind, UOp};
pub use runtime::{Blob, BufferHandle, DummyConfig, DummyRuntime, Runtime};
pub use shape::{Axis, Dim};
pub use tensor::{Tensor, TensorId};

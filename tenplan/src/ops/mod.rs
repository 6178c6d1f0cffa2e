//! Operator kinds and their rules.
//!
//! Every kind provides a validity rule, checked once when the operator is
//! created, and a shape rule, rerun by shape inference whenever input shapes
//! change. Allocator, sort and rewrite passes never look inside these rules.

use crate::{dtype::DType, shape::Dim};

mod concat;
mod elementwise;
mod matmul;
mod transpose;

pub use elementwise::{BOp, UOp};
pub(crate) use transpose::{is_inverse, swaps_last_two};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Matrix multiplication over the last two dimensions, batch dimensions broadcast
    MatMul { trans_a: bool, trans_b: bool },
    /// Output axis i is input axis `permute[i]`
    Transpose { permute: Vec<usize> },
    /// Joins inputs along axis, negative axis counts from the end
    Concat { axis: isize },
    Unary(UOp),
    /// Elementwise with multidirectional broadcasting
    Binary(BOp),
    Cast { dtype: DType },
}

impl OpKind {
    /// Structural checks that do not depend on shapes
    pub(crate) fn validate(&self, dtypes: &[DType]) -> Result<(), Box<str>> {
        match self {
            OpKind::MatMul { .. } => matmul::validate(dtypes),
            OpKind::Transpose { permute } => transpose::validate(permute, dtypes),
            OpKind::Concat { .. } => concat::validate(dtypes),
            OpKind::Unary(uop) => elementwise::validate_unary(*uop, dtypes),
            OpKind::Binary(_) => elementwise::validate_binary(dtypes),
            OpKind::Cast { .. } => expect_inputs(dtypes, 1),
        }
    }

    /// Output shapes for given input shapes
    pub(crate) fn infer_shapes(&self, shapes: &[&[Dim]]) -> Result<Vec<Vec<Dim>>, Box<str>> {
        let shape = match self {
            OpKind::MatMul { trans_a, trans_b } => {
                let [a, b] = shapes else {
                    return Err("matmul needs two inputs".into());
                };
                matmul::infer_shape(a, b, *trans_a, *trans_b)?
            }
            OpKind::Transpose { permute } => {
                let [x] = shapes else {
                    return Err("transpose needs one input".into());
                };
                transpose::infer_shape(x, permute)?
            }
            OpKind::Concat { axis } => concat::infer_shape(shapes, *axis)?,
            OpKind::Unary(_) | OpKind::Cast { .. } => {
                let [x] = shapes else {
                    return Err("unary op needs one input".into());
                };
                x.to_vec()
            }
            OpKind::Binary(_) => {
                let [x, y] = shapes else {
                    return Err("binary op needs two inputs".into());
                };
                crate::shape::broadcast(x, y)?
            }
        };
        Ok(vec![shape])
    }

    /// Output dtypes, inputs were already validated
    pub(crate) fn infer_dtypes(&self, dtypes: &[DType]) -> Vec<DType> {
        match self {
            OpKind::Cast { dtype } => vec![*dtype],
            _ => vec![dtypes[0]],
        }
    }
}

impl core::fmt::Display for OpKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OpKind::MatMul { trans_a, trans_b } => f.write_fmt(format_args!(
                "MatMul([{},{}])",
                if *trans_a { "A^T" } else { "A" },
                if *trans_b { "B^T" } else { "B" }
            )),
            OpKind::Transpose { permute } => f.write_fmt(format_args!("Transpose({permute:?})")),
            OpKind::Concat { axis } => f.write_fmt(format_args!("Concat(dim={axis})")),
            OpKind::Unary(uop) => f.write_fmt(format_args!("{uop:?}")),
            OpKind::Binary(bop) => f.write_fmt(format_args!("{bop:?}")),
            OpKind::Cast { dtype } => f.write_fmt(format_args!("Cast({dtype})")),
        }
    }
}

fn expect_inputs(dtypes: &[DType], n: usize) -> Result<(), Box<str>> {
    if dtypes.len() != n {
        return Err(format!("expected {n} inputs, got {}", dtypes.len()).into());
    }
    Ok(())
}

fn same_dtypes(dtypes: &[DType]) -> Result<(), Box<str>> {
    if let Some(first) = dtypes.first() {
        if let Some(other) = dtypes.iter().find(|d| *d != first) {
            return Err(format!("mixed dtypes {first} and {other}").into());
        }
    }
    Ok(())
}

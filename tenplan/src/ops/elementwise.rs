use super::{expect_inputs, same_dtypes};
use crate::dtype::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UOp {
    Relu,
    Sigmoid,
    Tanh,
    Abs,
    Neg,
    Sqrt,
    Exp,
}

impl UOp {
    const fn needs_float(self) -> bool {
        matches!(self, UOp::Sigmoid | UOp::Tanh | UOp::Sqrt | UOp::Exp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BOp {
    Add,
    Sub,
    Mul,
    Div,
}

pub(super) fn validate_unary(uop: UOp, dtypes: &[DType]) -> Result<(), Box<str>> {
    expect_inputs(dtypes, 1)?;
    if dtypes[0] == DType::Bool || (uop.needs_float() && !dtypes[0].is_float()) {
        return Err(format!("{uop:?} is not defined for {}", dtypes[0]).into());
    }
    Ok(())
}

pub(super) fn validate_binary(dtypes: &[DType]) -> Result<(), Box<str>> {
    expect_inputs(dtypes, 2)?;
    same_dtypes(dtypes)
}

#[test]
fn unary_dtypes() {
    assert!(validate_unary(UOp::Exp, &[DType::F16]).is_ok());
    assert!(validate_unary(UOp::Exp, &[DType::I32]).is_err());
    assert!(validate_unary(UOp::Neg, &[DType::I32]).is_ok());
    assert!(validate_unary(UOp::Relu, &[DType::Bool]).is_err());
    assert!(validate_unary(UOp::Relu, &[DType::F32, DType::F32]).is_err());
}

#[test]
fn binary_dtypes() {
    assert!(validate_binary(&[DType::F32, DType::F32]).is_ok());
    assert!(validate_binary(&[DType::F32, DType::I32]).is_err());
}

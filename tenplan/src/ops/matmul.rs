use super::{expect_inputs, same_dtypes};
use crate::{dtype::DType, shape::Dim};

pub(super) fn validate(dtypes: &[DType]) -> Result<(), Box<str>> {
    expect_inputs(dtypes, 2)?;
    same_dtypes(dtypes)
}

// Rows and columns of the operand as it enters the multiplication
fn matrix(x: &[Dim], trans: bool) -> (Dim, Dim) {
    let r = x.len();
    if trans {
        (x[r - 1], x[r - 2])
    } else {
        (x[r - 2], x[r - 1])
    }
}

// Batch dims are right aligned, each output dim is the larger of the pair
fn batch_dims(a: &[Dim], b: &[Dim]) -> Vec<Dim> {
    let rank = a.len().max(b.len());
    let dim = |x: &[Dim], i: usize| if i < rank - x.len() { 1 } else { x[i + x.len() - rank] };
    (0..rank).map(|i| dim(a, i).max(dim(b, i))).collect()
}

pub(super) fn infer_shape(a: &[Dim], b: &[Dim], trans_a: bool, trans_b: bool) -> Result<Vec<Dim>, Box<str>> {
    if a.len() < 2 || b.len() < 2 {
        return Err(format!("matmul operands need rank at least 2, got {a:?} and {b:?}").into());
    }
    let (m, ka) = matrix(a, trans_a);
    let (kb, n) = matrix(b, trans_b);
    if ka != kb {
        return Err(format!("matmul contraction mismatch {ka} != {kb} for {a:?} and {b:?}").into());
    }
    let mut shape = batch_dims(&a[..a.len() - 2], &b[..b.len() - 2]);
    shape.push(m);
    shape.push(n);
    Ok(shape)
}

#[test]
fn plain_and_transposed() {
    assert_eq!(infer_shape(&[3, 4], &[4, 5], false, false).unwrap(), [3, 5]);
    assert_eq!(infer_shape(&[4, 3], &[4, 5], true, false).unwrap(), [3, 5]);
    assert_eq!(infer_shape(&[3, 4], &[5, 4], false, true).unwrap(), [3, 5]);
    assert_eq!(infer_shape(&[4, 3], &[5, 4], true, true).unwrap(), [3, 5]);
}

#[test]
fn batch_dims_broadcast() {
    assert_eq!(infer_shape(&[2, 1, 3, 4], &[6, 4, 5], false, false).unwrap(), [2, 6, 3, 5]);
    assert_eq!(infer_shape(&[7, 3, 4], &[4, 5], false, false).unwrap(), [7, 3, 5]);
    assert_eq!(infer_shape(&[2, 3, 4], &[3, 4, 5], false, false).unwrap(), [3, 3, 5]);
    assert_eq!(infer_shape(&[5, 1, 3, 4], &[2, 4, 5], false, false).unwrap(), [5, 2, 3, 5]);
}

#[test]
fn rejects_bad_operands() {
    assert!(infer_shape(&[4], &[4, 5], false, false).is_err());
    assert!(infer_shape(&[3, 4], &[3, 5], false, false).is_err());
}

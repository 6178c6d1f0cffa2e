use super::expect_inputs;
use crate::{
    dtype::DType,
    shape::{is_permutation, permute, Dim},
};

pub(super) fn validate(axes: &[usize], dtypes: &[DType]) -> Result<(), Box<str>> {
    expect_inputs(dtypes, 1)?;
    if !is_permutation(axes, axes.len()) {
        return Err(format!("{axes:?} is not a permutation").into());
    }
    Ok(())
}

pub(super) fn infer_shape(x: &[Dim], axes: &[usize]) -> Result<Vec<Dim>, Box<str>> {
    if !is_permutation(axes, x.len()) {
        return Err(format!("can not permute shape {x:?} with {axes:?}").into());
    }
    Ok(permute(x, axes))
}

/// True when applying `first` and then `second` leaves every axis in place
#[must_use]
pub fn is_inverse(first: &[usize], second: &[usize]) -> bool {
    first.len() == second.len()
        && second.iter().enumerate().all(|(i, &a)| a < first.len() && first[a] == i)
}

/// True when permute swaps the last two axes and keeps all other axes in place
#[must_use]
pub fn swaps_last_two(permute: &[usize]) -> bool {
    let r = permute.len();
    r >= 2
        && permute[r - 2] == r - 1
        && permute[r - 1] == r - 2
        && permute[..r - 2].iter().enumerate().all(|(i, &a)| a == i)
}

#[test]
fn inverse_permutes() {
    assert!(is_inverse(&[1, 2, 0], &[2, 0, 1]));
    assert!(is_inverse(&[0, 1], &[0, 1]));
    assert!(!is_inverse(&[1, 2, 0], &[1, 2, 0]));
    assert!(!is_inverse(&[1, 0], &[0, 2, 1]));
}

#[test]
fn last_two_swap() {
    assert!(swaps_last_two(&[1, 0]));
    assert!(swaps_last_two(&[0, 1, 3, 2]));
    assert!(!swaps_last_two(&[1, 0, 3, 2]));
    assert!(!swaps_last_two(&[0, 2, 1, 3]));
    assert!(!swaps_last_two(&[0]));
}

#[test]
fn permuted_shape() {
    assert_eq!(infer_shape(&[2, 3, 4], &[2, 0, 1]).unwrap(), [4, 2, 3]);
    assert!(infer_shape(&[2, 3], &[2, 0, 1]).is_err());
}

use super::same_dtypes;
use crate::{
    dtype::DType,
    shape::{real_axis, Dim},
};

pub(super) fn validate(dtypes: &[DType]) -> Result<(), Box<str>> {
    if dtypes.is_empty() {
        return Err("concat needs at least one input".into());
    }
    same_dtypes(dtypes)
}

// https://onnx.ai/onnx/operators/onnx__Concat.html
pub(super) fn infer_shape(shapes: &[&[Dim]], axis: isize) -> Result<Vec<Dim>, Box<str>> {
    let Some(first) = shapes.first() else {
        return Err("concat needs at least one input".into());
    };
    let rank = first.len();
    let axis = real_axis(axis, rank)?;
    let mut shape = first.to_vec();
    for x in &shapes[1..] {
        if x.len() != rank {
            return Err(format!("concat rank mismatch {first:?} and {x:?}").into());
        }
        for (d, (a, b)) in first.iter().zip(x.iter()).enumerate() {
            if d != axis && a != b {
                return Err(format!("concat shapes {first:?} and {x:?} differ outside axis {axis}").into());
            }
        }
        shape[axis] += x[axis];
    }
    Ok(shape)
}

#[test]
fn concat_on_axis() {
    assert_eq!(
        infer_shape(&[&[2, 2, 3, 1], &[2, 2, 1, 1], &[2, 2, 2, 1]], 2).unwrap(),
        [2, 2, 6, 1]
    );
    assert_eq!(infer_shape(&[&[2, 3], &[2, 4]], -1).unwrap(), [2, 7]);
    assert_eq!(infer_shape(&[&[2, 3]], 0).unwrap(), [2, 3]);
}

#[test]
fn concat_mismatch() {
    assert!(infer_shape(&[&[2, 3], &[3, 3]], 1).is_err());
    assert!(infer_shape(&[&[2, 3], &[2, 3, 1]], 0).is_err());
    assert!(infer_shape(&[&[2, 3]], 2).is_err());
}

//! Shape helpers shared by operator rules.

pub type Dim = usize;
pub type Axis = isize;

/// Number of elements in tensor with this shape
#[must_use]
pub fn numel(shape: &[Dim]) -> usize {
    shape.iter().product()
}

/// Converts possibly negative axis into index into shape of given rank
pub fn real_axis(axis: Axis, rank: usize) -> Result<usize, Box<str>> {
    let r = isize::try_from(rank).map_err(|_| Box::<str>::from("rank too large"))?;
    if axis >= r || axis < -r {
        return Err(format!("axis {axis} out of range for rank {rank}").into());
    }
    Ok(if axis < 0 { (axis + r) as usize } else { axis as usize })
}

/// Checks that permute contains every axis of 0..rank exactly once
#[must_use]
pub fn is_permutation(permute: &[usize], rank: usize) -> bool {
    if permute.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &a in permute {
        if a >= rank || seen[a] {
            return false;
        }
        seen[a] = true;
    }
    true
}

#[must_use]
pub fn permute(shape: &[Dim], axes: &[usize]) -> Vec<Dim> {
    axes.iter().map(|&a| shape[a]).collect()
}

/// Multidirectional broadcast, shapes are aligned from the last dimension.
/// Dimensions must be equal or one of them must be 1.
pub fn broadcast(x: &[Dim], y: &[Dim]) -> Result<Vec<Dim>, Box<str>> {
    let rank = x.len().max(y.len());
    let mut res = Vec::with_capacity(rank);
    for i in 0..rank {
        let a = if i < rank - x.len() { 1 } else { x[i + x.len() - rank] };
        let b = if i < rank - y.len() { 1 } else { y[i + y.len() - rank] };
        if a != b && a != 1 && b != 1 {
            return Err(format!("shapes {x:?} and {y:?} can not be broadcasted").into());
        }
        res.push(a.max(b));
    }
    Ok(res)
}

#[test]
fn broadcast_aligns_trailing_dims() {
    assert_eq!(broadcast(&[2, 1, 4], &[3, 1]).unwrap(), [2, 3, 4]);
    assert_eq!(broadcast(&[5], &[]).unwrap(), [5]);
    assert!(broadcast(&[2, 3], &[4, 3]).is_err());
}

#[test]
fn negative_axes() {
    assert_eq!(real_axis(-1, 4).unwrap(), 3);
    assert_eq!(real_axis(2, 4).unwrap(), 2);
    assert!(real_axis(4, 4).is_err());
    assert!(real_axis(-5, 4).is_err());
}

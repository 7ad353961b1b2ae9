//! Index arithmetic shared by `list`, `tuple`, `str` and `range`.

use crate::runtime::error::{RuntimeError, RuntimeResult};

/// Resolves a possibly negative index against `len`.
pub(crate) fn normalize_index(index: i64, len: usize, what: &str) -> RuntimeResult<usize> {
    let resolved = if index < 0 {
        index + len as i64
    } else {
        index
    };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RuntimeError::Index(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

/// Positions selected by `seq[start:stop:step]`, in visiting order.
pub(crate) fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> RuntimeResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };

    let mut positions = Vec::new();
    if step > 0 {
        let start = start.map_or(0, |bound| clamp(bound, 0, len));
        let stop = stop.map_or(len, |bound| clamp(bound, 0, len));
        let mut index = start;
        while index < stop {
            positions.push(index as usize);
            let Some(next) = index.checked_add(step) else { break };
            index = next;
        }
    } else {
        let start = start.map_or(len - 1, |bound| clamp(bound, -1, len - 1));
        let stop = stop.map_or(-1, |bound| clamp(bound, -1, len - 1));
        let mut index = start;
        while index > stop {
            positions.push(index as usize);
            let Some(next) = index.checked_add(step) else { break };
            index = next;
        }
    }
    Ok(positions)
}

/// Longest sequence `*` may build, in elements (or bytes for `str`).
pub(crate) const MAX_REPEAT_LEN: usize = 1 << 28;

/// Length of `len` items repeated `times` times, or `OverflowError` when it
/// would exceed [`MAX_REPEAT_LEN`]. Non-positive counts give zero.
pub(crate) fn repeat_len(len: usize, times: i64) -> RuntimeResult<usize> {
    if times <= 0 || len == 0 {
        return Ok(0);
    }
    usize::try_from(times)
        .ok()
        .and_then(|times| len.checked_mul(times))
        .filter(|total| *total <= MAX_REPEAT_LEN)
        .ok_or_else(|| RuntimeError::Overflow("repeated sequence is too long".into()))
}

pub(crate) fn repeat<T: Clone>(items: &[T], times: i64) -> RuntimeResult<Vec<T>> {
    let total = repeat_len(items.len(), times)?;
    let mut repeated = Vec::with_capacity(total);
    while repeated.len() < total {
        repeated.extend_from_slice(items);
    }
    Ok(repeated)
}

/// Stable merge sort with a fallible comparison. `less(a, b)` reports
/// whether `a` must come before `b`; ties keep their input order.
pub(crate) fn merge_sort<T: Clone>(
    items: Vec<T>,
    less: &mut dyn FnMut(&T, &T) -> RuntimeResult<bool>,
) -> RuntimeResult<Vec<T>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, less)?;
    let right = merge_sort(right, less)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if less(&right[j], &left[i])? {
            merged.push(right[j].clone());
            j += 1;
        } else {
            merged.push(left[i].clone());
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn negative_indices_wrap_once() {
        assert_eq!(normalize_index(-1, 3, "list").expect("in range"), 2);
        assert_eq!(
            normalize_index(3, 3, "list").expect_err("out of range"),
            RuntimeError::Index("list index out of range".into())
        );
        assert!(normalize_index(-4, 3, "tuple").is_err());
    }

    #[test]
    fn slices_follow_python_bounds() {
        assert_eq!(slice_indices(5, Some(1), None, None).expect("slice"), vec![1, 2, 3, 4]);
        assert_eq!(slice_indices(5, None, Some(-2), None).expect("slice"), vec![0, 1, 2]);
        assert_eq!(slice_indices(5, None, None, Some(-2)).expect("slice"), vec![4, 2, 0]);
        assert_eq!(slice_indices(5, Some(10), None, None).expect("slice"), Vec::<usize>::new());
        assert_eq!(slice_indices(3, Some(-10), Some(10), None).expect("slice"), vec![0, 1, 2]);
        assert!(slice_indices(3, None, None, Some(0)).is_err());
    }

    #[test]
    fn huge_steps_stop_at_the_first_position() {
        assert_eq!(slice_indices(3, Some(1), None, Some(i64::MAX)).expect("slice"), vec![1]);
        assert_eq!(slice_indices(3, None, None, Some(i64::MIN)).expect("slice"), vec![2]);
        assert_eq!(
            slice_indices(3, Some(i64::MIN), Some(i64::MAX), Some(i64::MAX - 1)).expect("slice"),
            vec![0]
        );
    }

    #[test]
    fn repetition_of_non_positive_counts_is_empty() {
        assert_eq!(repeat(&[1, 2], 2).expect("repeat"), vec![1, 2, 1, 2]);
        assert!(repeat(&[1], 0).expect("repeat").is_empty());
        assert!(repeat(&[1], -3).expect("repeat").is_empty());
        assert!(repeat::<i32>(&[], i64::MAX).expect("repeat").is_empty());
    }

    #[test]
    fn oversized_repetition_is_an_overflow() {
        assert!(matches!(repeat(&[0, 0, 0, 0], 1 << 62), Err(RuntimeError::Overflow(_))));
        assert!(matches!(repeat(&[0], i64::MAX), Err(RuntimeError::Overflow(_))));
        assert_eq!(repeat_len(2, 3).expect("len"), 6);
        assert!(repeat_len(4, (MAX_REPEAT_LEN / 4 + 1) as i64).is_err());
    }

    #[test]
    fn merge_sort_is_stable() {
        let pairs = vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')];
        let sorted = merge_sort(pairs, &mut |a, b| Ok(a.0 < b.0)).expect("sort");
        assert_eq!(sorted, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[test]
    fn merge_sort_propagates_comparison_errors() {
        let result = merge_sort(vec![3, 1, 2], &mut |_, _| Err(RuntimeError::type_error("no order")));
        assert!(result.is_err());
    }
}

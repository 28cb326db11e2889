//! Permutation and axes arithmetic
//!
//! Pure helpers over `perm` and `axes` vectors. A perm of rank r contains
//! each of 0..r exactly once; applied to a shape s it produces s' with
//! s'[i] = s[perm[i]].

use crate::proto::NodeProto;

/// Returns whether perm contains each value from 0 to perm.len() - 1 exactly once
pub fn is_valid_perm(perm: &[i64]) -> bool {
    let rank = perm.len() as i64;
    let mut used = vec![false; perm.len()];
    for &p in perm {
        if p < 0 || p >= rank || used[p as usize] {
            return false;
        }
        used[p as usize] = true;
    }
    true
}

/// Read a Transpose node's perm attribute, rejecting invalid permutations
pub fn get_perm_attr_if_valid(node: &NodeProto) -> Option<Vec<i64>> {
    let perm = node.get_attribute_ints("perm")?;
    if !is_valid_perm(perm) {
        return None;
    }
    Some(perm.to_vec())
}

/// Computes the inverse permutation. perm must be valid.
pub fn invert_perm(perm: &[i64]) -> Vec<i64> {
    let mut inv = vec![0i64; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p as usize] = i as i64;
    }
    inv
}

/// Computes the permutation equivalent to applying perm1 then perm2
///
/// out[i] = perm1[perm2[i]]. Both perms must be valid and of equal length.
pub fn compose_perm(perm1: &[i64], perm2: &[i64]) -> Vec<i64> {
    perm2.iter().map(|&p| perm1[p as usize]).collect()
}

/// Returns true if perm[i] = i everywhere
pub fn is_identity_perm(perm: &[i64]) -> bool {
    perm.iter().enumerate().all(|(i, &p)| p == i as i64)
}

/// Permutation from channel-last to channel-first ordering of the given rank
///
/// For rank r >= 1: [0, r-1, 1, 2, ..., r-2]. Most handlers work for any
/// permutation; the pooling and MaxPool handlers are restricted to this one.
pub fn channel_last_to_first_perm(rank: usize) -> Vec<i64> {
    let mut p = Vec::with_capacity(rank);
    if rank == 0 {
        return p;
    }
    p.push(0);
    if rank > 1 {
        p.push(rank as i64 - 1);
        for i in 2..rank {
            p.push(i as i64 - 1);
        }
    }
    p
}

/// Adds rank to negative axes; rejects out-of-range and duplicate entries
pub fn normalize_and_validate_axes(axes: &mut [i64], rank: usize) -> bool {
    let rank_int = rank as i64;
    let mut used = vec![false; rank];
    for a in axes.iter_mut() {
        if *a < 0 {
            *a += rank_int;
        }
        if *a < 0 || *a >= rank_int || used[*a as usize] {
            return false;
        }
        used[*a as usize] = true;
    }
    true
}

/// Adds rank to a negative axis; rejects out-of-range values
pub fn normalize_and_validate_axis(axis: &mut i64, rank: usize) -> bool {
    let rank_int = rank as i64;
    if *axis < 0 {
        *axis += rank_int;
    }
    *axis >= 0 && *axis < rank_int
}

/// Inserts 1-dims into shape at the positions in axes
///
/// Positions refer to the new rank. Axes must be normalized and unique.
pub fn unsqueeze_shape(shape: &[i64], axes: &[i64]) -> Vec<i64> {
    let new_rank = shape.len() + axes.len();
    let mut is_added = vec![false; new_rank];
    for &a in axes {
        is_added[a as usize] = true;
    }

    let mut old = shape.iter();
    let mut new_shape = Vec::with_capacity(new_rank);
    for added in is_added {
        if added {
            new_shape.push(1);
        } else {
            new_shape.push(*old.next().unwrap_or(&1));
        }
    }
    new_shape
}

/// Computes the perm for the unsqueezed version of a tensor
///
/// Added 1-dims stay in place; the remaining dims are reordered the way perm
/// reordered the original dims.
///
/// Ex: perm = [2, 0, 1] maps [A, B, C] -> [C, A, B]. With axes = [0, 3] the
/// result [0, 4, 1, 3, 2] maps [1, A, B, 1, C] -> [1, C, A, 1, B].
pub fn unsqueeze_perm(axes: &[i64], perm: &[i64]) -> Vec<i64> {
    let new_rank = perm.len() + axes.len();

    let mut is_added = vec![false; new_rank];
    for &a in axes {
        is_added[a as usize] = true;
    }

    // Map original axis indices to their unsqueezed positions
    let mut axes_map = Vec::with_capacity(perm.len());
    for (i, added) in is_added.iter().enumerate() {
        if !added {
            axes_map.push(i as i64);
        }
    }

    let mut new_perm = Vec::with_capacity(new_rank);
    let mut j = 0;
    for (i, added) in is_added.iter().enumerate() {
        if *added {
            // Leave 1s in the same place
            new_perm.push(i as i64);
        } else {
            new_perm.push(axes_map[perm[j] as usize]);
            j += 1;
        }
    }
    new_perm
}

/// Computes the perm for the squeezed version of a tensor
///
/// Result has length perm.len() - axes.len() and reorders the retained dims
/// according to perm.
pub fn squeeze_perm(axes: &[i64], perm: &[i64]) -> Vec<i64> {
    let mut is_removed = vec![false; perm.len()];
    for &a in axes {
        is_removed[a as usize] = true;
    }

    // Renumber retained axes into the compacted range
    let mut axes_map = vec![0i64; perm.len()];
    let mut j = 0;
    for (i, removed) in is_removed.iter().enumerate() {
        if !removed {
            axes_map[i] = j;
            j += 1;
        }
    }

    let mut new_perm = Vec::with_capacity(perm.len() - axes.len());
    for &p in perm {
        if !is_removed[p as usize] {
            new_perm.push(axes_map[p as usize]);
        }
    }
    new_perm
}

/// New axes values for an input that has been permuted using perm,
/// preserving order
///
/// Ex: perm = [2, 0, 1], axes = [0, 1] -> [2, 0]
pub fn axes_for_transposed_input(axes: &[i64], perm: &[i64]) -> Vec<i64> {
    axes.iter().map(|&a| perm[a as usize]).collect()
}

/// New axes values for an input that has been permuted using perm, sorted
/// ascending
///
/// Axes attributes are commonly sorted, unless order lines up with other
/// positional inputs as in Slice.
///
/// Ex: perm = [2, 0, 1], axes = [0, 1] -> [0, 2]
pub fn sorted_axes_for_transposed_input(axes: &[i64], perm: &[i64]) -> Vec<i64> {
    let mut include = vec![false; perm.len()];
    for &a in axes {
        include[perm[a as usize] as usize] = true;
    }

    include
        .iter()
        .enumerate()
        .filter(|(_, &inc)| inc)
        .map(|(i, _)| i as i64)
        .collect()
}

/// Reorder a pads vector (all starts then all ends) according to perm
///
/// pads has length 2r; the first r entries are reordered by perm, then the
/// last r entries.
pub fn permute_pads(pads: &[i64], perm: &[i64]) -> Vec<i64> {
    let rank = perm.len();
    let mut new_pads = Vec::with_capacity(rank * 2);
    for &p in perm {
        new_pads.push(pads[p as usize]);
    }
    for &p in perm {
        new_pads.push(pads[p as usize + rank]);
    }
    new_pads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    #[test]
    fn test_is_valid_perm() {
        assert!(is_valid_perm(&[0, 2, 1]));
        assert!(is_valid_perm(&[]));
        assert!(!is_valid_perm(&[0, 0, 1]));
        assert!(!is_valid_perm(&[1, 2, 3]));
        assert!(!is_valid_perm(&[-1, 0, 1]));
    }

    #[test]
    fn test_get_perm_attr_if_valid() {
        let mut node = make_node("Transpose", &["x"], &["y"], "t");
        assert_eq!(get_perm_attr_if_valid(&node), None);

        node.set_attribute_ints("perm", vec![1, 0]);
        assert_eq!(get_perm_attr_if_valid(&node), Some(vec![1, 0]));

        node.set_attribute_ints("perm", vec![1, 1]);
        assert_eq!(get_perm_attr_if_valid(&node), None);
    }

    #[test]
    fn test_invert_perm() {
        assert_eq!(invert_perm(&[2, 0, 1]), vec![1, 2, 0]);
        assert_eq!(invert_perm(&[0, 1, 2]), vec![0, 1, 2]);
    }

    #[test]
    fn test_invert_is_involutive() {
        let perms: [&[i64]; 3] = [&[2, 0, 1], &[0, 3, 1, 2], &[1, 0]];
        for p in perms {
            assert_eq!(invert_perm(&invert_perm(p)), p.to_vec());
        }
    }

    #[test]
    fn test_compose_perm() {
        // Apply [1, 0, 2] then [2, 0, 1]
        assert_eq!(compose_perm(&[1, 0, 2], &[2, 0, 1]), vec![2, 1, 0]);
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let p = vec![0, 3, 1, 2];
        let inv = invert_perm(&p);
        assert!(is_identity_perm(&compose_perm(&p, &inv)));
        assert!(is_identity_perm(&compose_perm(&inv, &p)));
    }

    #[test]
    fn test_compose_matches_shape_application() {
        // Applying p1 then p2 to a shape equals applying compose_perm(p1, p2)
        let shape = [10i64, 20, 30, 40];
        let p1 = vec![0, 3, 1, 2];
        let p2 = vec![2, 0, 3, 1];

        let apply = |s: &[i64], p: &[i64]| -> Vec<i64> {
            p.iter().map(|&i| s[i as usize]).collect()
        };

        let step = apply(&apply(&shape, &p1), &p2);
        let combined = apply(&shape, &compose_perm(&p1, &p2));
        assert_eq!(step, combined);
    }

    #[test]
    fn test_is_identity_perm() {
        assert!(is_identity_perm(&[0, 1, 2]));
        assert!(is_identity_perm(&[]));
        assert!(!is_identity_perm(&[0, 2, 1]));
    }

    #[test]
    fn test_channel_last_to_first_perm() {
        assert_eq!(channel_last_to_first_perm(4), vec![0, 3, 1, 2]);
        assert_eq!(channel_last_to_first_perm(3), vec![0, 2, 1]);
        assert_eq!(channel_last_to_first_perm(1), vec![0]);
    }

    #[test]
    fn test_normalize_and_validate_axes() {
        let mut axes = vec![-1, 0];
        assert!(normalize_and_validate_axes(&mut axes, 3));
        assert_eq!(axes, vec![2, 0]);

        let mut dup = vec![1, -2];
        assert!(!normalize_and_validate_axes(&mut dup, 3));

        let mut out_of_range = vec![3];
        assert!(!normalize_and_validate_axes(&mut out_of_range, 3));

        let mut dup_positive = vec![1, 1];
        assert!(!normalize_and_validate_axes(&mut dup_positive, 3));
    }

    #[test]
    fn test_normalize_and_validate_axis() {
        let mut axis = -1;
        assert!(normalize_and_validate_axis(&mut axis, 4));
        assert_eq!(axis, 3);

        let mut bad = 4;
        assert!(!normalize_and_validate_axis(&mut bad, 4));
        let mut very_negative = -5;
        assert!(!normalize_and_validate_axis(&mut very_negative, 4));
    }

    #[test]
    fn test_unsqueeze_shape() {
        assert_eq!(unsqueeze_shape(&[5, 7], &[0, 3]), vec![1, 5, 7, 1]);
        assert_eq!(unsqueeze_shape(&[2, 3, 4], &[1]), vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_unsqueeze_perm() {
        assert_eq!(unsqueeze_perm(&[0, 3], &[2, 0, 1]), vec![0, 4, 1, 3, 2]);
        assert_eq!(unsqueeze_perm(&[], &[1, 0]), vec![1, 0]);
    }

    #[test]
    fn test_squeeze_perm() {
        assert_eq!(squeeze_perm(&[1, 2], &[0, 3, 1, 2]), vec![0, 1]);
        assert_eq!(squeeze_perm(&[0, 3], &[0, 4, 1, 3, 2]), vec![2, 0, 1]);
        assert_eq!(squeeze_perm(&[], &[1, 0]), vec![1, 0]);
    }

    #[test]
    fn test_squeeze_undoes_unsqueeze() {
        let perm = vec![2, 0, 1];
        let axes = vec![1, 3];
        assert_eq!(squeeze_perm(&axes, &unsqueeze_perm(&axes, &perm)), perm);
    }

    #[test]
    fn test_axes_for_transposed_input() {
        assert_eq!(axes_for_transposed_input(&[0, 1], &[2, 0, 1]), vec![2, 0]);
    }

    #[test]
    fn test_sorted_axes_for_transposed_input() {
        assert_eq!(
            sorted_axes_for_transposed_input(&[0, 1], &[2, 0, 1]),
            vec![0, 2]
        );
        assert_eq!(
            sorted_axes_for_transposed_input(&[2, 3], &[0, 3, 1, 2]),
            vec![1, 2]
        );
    }

    #[test]
    fn test_permute_pads() {
        // rank 2: pads = [s0, s1, e0, e1], perm [1, 0]
        assert_eq!(permute_pads(&[1, 2, 3, 4], &[1, 0]), vec![2, 1, 4, 3]);
        // rank 4 channel swap
        assert_eq!(
            permute_pads(&[0, 1, 2, 3, 4, 5, 6, 7], &[0, 3, 1, 2]),
            vec![0, 3, 1, 2, 4, 7, 5, 6]
        );
    }
}

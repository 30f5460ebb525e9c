//! Key-tree navigation and descent.
//!
//! The decoder's subscription stores a *covering set* of the complete
//! binary tree of depth 64: the minimal set of subtree roots whose union of
//! descendant leaves is exactly `[start, end]`, stored left-boundary-first
//! from index 0 and right-boundary-first from `key_count - 1` downward.
//! `key_index_for_time` walks that stored order to find which entry covers
//! a given timestamp; `derive_tree_key` then walks from that entry down to
//! the timestamp's leaf key. Both are transcribed from `frame.c`'s
//! `key_index_for_time`/`derive_tree_key_helper` - this is the one piece of
//! the original decoder this tree does *not* take a shortcut on, since it
//! is exactly what makes the subscription scheme logarithmic instead of
//! one-key-per-timestamp.

use design_utils::crypto::{kdf_child, kdf_leaf, TREE_KEY_LEN, TREE_SIDE_CONST_LEN};
use design_utils::fi_shield::multi_if_failin;

pub const MAX_TREE_HEIGHT: u8 = 64;

/// A node of the depth-64 complete binary tree: the `bits`-bit prefix
/// shared by every leaf in its subtree, left-aligned into a `u64`'s low
/// bits the way `frame.c` stores it (`bits == 64` names a single leaf,
/// `bits == 0` names the whole tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vertex {
    pub prefix: u64,
    pub bits: u8,
}

/// Finds which of the `key_count` covering-set entries for `[start, end]`
/// contains leaf `t`, returning its storage index and the vertex it names.
/// Returns `None` if `t` falls outside `[start, end]` or `key_count == 0`.
pub fn key_index_for_time(start: u64, end: u64, key_count: u32, t: u64) -> Option<(usize, Vertex)> {
    let key_count = key_count as usize;
    if key_count == 0 {
        return None;
    }

    let mut start_idx = 0usize;
    let mut end_idx = key_count - 1;
    let mut start_prefix = start;
    let mut end_prefix = end;
    let mut t = t;
    let mut bits: u8 = 0;

    let is_out_of_range = t < start_prefix || end_prefix < t;
    if multi_if_failin(is_out_of_range) {
        return None;
    }

    loop {
        debug_assert!(start_prefix <= t && t <= end_prefix);
        debug_assert!(start_idx <= end_idx);

        if start_prefix & 1 == 0 && end_prefix & 1 == 1 {
            // the whole remaining range shares one more common ancestor bit
            start_prefix >>= 1;
            end_prefix >>= 1;
            t >>= 1;
            bits += 1;
        } else if start_prefix & 1 == 1 {
            if start_prefix == t {
                return Some((start_idx, Vertex { prefix: start_prefix, bits: MAX_TREE_HEIGHT - bits }));
            }
            start_prefix += 1;
            start_idx += 1;
        } else {
            if end_prefix == t {
                return Some((end_idx, Vertex { prefix: end_prefix, bits: MAX_TREE_HEIGHT - bits }));
            }
            end_prefix -= 1;
            end_idx -= 1;
        }
    }
}

/// Derives the leaf symmetric key for timestamp `t`, descending from
/// `vertex`'s 16-byte tree key down to `t`'s leaf one `kdf_child` step at a
/// time, MSB first, then widening the leaf tree key with `kdf_leaf`.
pub fn derive_tree_key(
    t: u64,
    vertex_key: &[u8; TREE_KEY_LEN],
    vertex: Vertex,
    left: &[u8; TREE_SIDE_CONST_LEN],
    right: &[u8; TREE_SIDE_CONST_LEN],
) -> [u8; 32] {
    let leaf_tree_key = if vertex.bits == MAX_TREE_HEIGHT {
        debug_assert_eq!(vertex.prefix, t);
        *vertex_key
    } else {
        let (path, path_bits) = if vertex.bits == 0 {
            debug_assert_eq!(vertex.prefix, 0);
            (t, MAX_TREE_HEIGHT)
        } else {
            debug_assert_eq!(t >> (MAX_TREE_HEIGHT - vertex.bits), vertex.prefix);
            let path = t ^ (vertex.prefix << (MAX_TREE_HEIGHT - vertex.bits));
            (path, MAX_TREE_HEIGHT - vertex.bits)
        };

        let mut key = *vertex_key;
        for level in 0..path_bits {
            let bit_from_msb = path_bits - level - 1;
            let going_right = (path >> bit_from_msb) & 1 == 1;
            key = if going_right {
                kdf_child(&key, right)
            } else {
                kdf_child(&key, left)
            };
        }
        key
    };

    kdf_leaf(&leaf_tree_key)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn single_full_range_entry_is_found_at_any_timestamp() {
        // key_count == 1 covering [0, u64::MAX] is the whole tree, bits == 0
        let found = key_index_for_time(0, u64::MAX, 1, 0x1234_5678).unwrap();
        assert_eq!(found.0, 0);
        assert_eq!(found.1, Vertex { prefix: 0, bits: 0 });
    }

    #[test]
    fn out_of_range_timestamp_is_rejected() {
        assert!(key_index_for_time(10, 20, 1, 9).is_none());
        assert!(key_index_for_time(10, 20, 1, 21).is_none());
    }

    #[test]
    fn zero_key_count_is_always_rejected() {
        assert!(key_index_for_time(0, u64::MAX, 0, 5).is_none());
    }

    #[test]
    fn boundary_aligned_range_uses_single_covering_subtree() {
        // [0, 7] is exactly one depth-61 subtree (2^3 = 8 leaves)
        let found = key_index_for_time(0, 7, 1, 3).unwrap();
        assert_eq!(found.1, Vertex { prefix: 0, bits: 61 });
    }

    #[test]
    fn misaligned_two_leaf_range_resolves_to_two_single_leaf_entries() {
        // [1, 2] straddles the {0,1}/{2,3} subtree boundary, so its minimal
        // covering set is the two individual leaves, stored in that order.
        let (idx0, v0) = key_index_for_time(1, 2, 2, 1).unwrap();
        assert_eq!((idx0, v0), (0, Vertex { prefix: 1, bits: MAX_TREE_HEIGHT }));

        let (idx1, v1) = key_index_for_time(1, 2, 2, 2).unwrap();
        assert_eq!((idx1, v1), (1, Vertex { prefix: 2, bits: MAX_TREE_HEIGHT }));
    }

    #[test]
    fn derive_tree_key_leaf_vertex_uses_key_directly() {
        let parent_key = [0x42u8; 16];
        let vertex = Vertex { prefix: 77, bits: MAX_TREE_HEIGHT };
        let left = [1u8; 32];
        let right = [2u8; 32];

        let derived = derive_tree_key(77, &parent_key, vertex, &left, &right);
        let expected = kdf_leaf(&parent_key);
        assert_eq!(derived, expected);
    }

    #[test]
    fn derive_tree_key_differs_by_path_direction() {
        let parent_key = [0x11u8; 16];
        let left = [3u8; 32];
        let right = [4u8; 32];

        // bits == 63 covers leaves {prefix<<1, (prefix<<1)|1}; pick prefix 0
        // so t=0 takes the left child and t=1 takes the right child.
        let vertex = Vertex { prefix: 0, bits: 63 };
        let left_leaf = derive_tree_key(0, &parent_key, vertex, &left, &right);
        let right_leaf = derive_tree_key(1, &parent_key, vertex, &left, &right);
        assert_ne!(left_leaf, right_leaf);
    }

    #[test]
    fn derive_tree_key_root_vertex_walks_full_height() {
        let parent_key = [0x99u8; 16];
        let left = [5u8; 32];
        let right = [6u8; 32];
        let vertex = Vertex { prefix: 0, bits: 0 };

        let a = derive_tree_key(123, &parent_key, vertex, &left, &right);
        let b = derive_tree_key(124, &parent_key, vertex, &left, &right);
        assert_ne!(a, b);
    }
}

//! Ordered id sequences.
//!
//! A [`Sequence`] is the display order of a list's cards or a board's lists.
//! Updates never mutate a sequence in place; every operation returns a new
//! one, which is what lets stores replace order wholesale.

use std::{collections::HashSet, hash::Hash, slice, vec};

use serde::{Deserialize, Serialize};

/// Ordered collection of ids defining display order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence<T>(Vec<T>);

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Sequence<T> {
    /// Empty sequence.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the sequence has no ids.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids in order.
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Iterate ids in order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.0.iter()
    }

    /// Unwrap into the underlying vector.
    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

impl<T: Copy + Eq> Sequence<T> {
    /// Index of `id`, if present.
    pub fn position(&self, id: T) -> Option<usize> {
        self.0.iter().position(|&x| x == id)
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: T) -> bool {
        self.0.contains(&id)
    }

    /// Copy of this sequence without `id`, or `None` if `id` is absent.
    pub fn without(&self, id: T) -> Option<Self> {
        let index = self.position(id)?;
        let mut ids = self.0.clone();
        ids.remove(index);
        Some(Self(ids))
    }

    /// Copy of this sequence with `id` inserted at `index`, clamped so an
    /// index past the end appends.
    pub fn with_inserted(&self, id: T, index: usize) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        let at = index.min(self.0.len());
        ids.extend_from_slice(&self.0[..at]);
        ids.push(id);
        ids.extend_from_slice(&self.0[at..]);
        Self(ids)
    }

    /// Copy of this sequence with `id` appended.
    pub fn with_appended(&self, id: T) -> Self {
        self.with_inserted(id, self.0.len())
    }

    /// Array-move: remove `id` from where it is and reinsert it at `index`
    /// in the post-removal sequence (clamped). `None` if `id` is absent.
    pub fn moved(&self, id: T, index: usize) -> Option<Self> {
        self.without(id).map(|rest| rest.with_inserted(id, index))
    }
}

impl<T: Copy + Eq + Hash> Sequence<T> {
    /// Whether any id appears more than once.
    pub fn has_duplicates(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.0.len());
        !self.0.iter().all(|id| seen.insert(*id))
    }
}

impl<T> From<Vec<T>> for Sequence<T> {
    fn from(ids: Vec<T>) -> Self {
        Self(ids)
    }
}

impl<T> From<Sequence<T>> for Vec<T> {
    fn from(sequence: Sequence<T>) -> Self {
        sequence.0
    }
}

impl<T> FromIterator<T> for Sequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> IntoIterator for Sequence<T> {
    type Item = T;
    type IntoIter = vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Sequence<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn seq(ids: &[u32]) -> Sequence<u32> {
        Sequence::from(ids.to_vec())
    }

    #[test]
    fn moved_uses_post_removal_index() {
        assert_eq!(seq(&[1, 2, 3]).moved(1, 2), Some(seq(&[2, 3, 1])));
        assert_eq!(seq(&[1, 2, 3]).moved(3, 0), Some(seq(&[3, 1, 2])));
        assert_eq!(seq(&[1, 2, 3]).moved(2, 1), Some(seq(&[1, 2, 3])));
    }

    #[test]
    fn moved_clamps_past_end() {
        assert_eq!(seq(&[1, 2, 3]).moved(1, 99), Some(seq(&[2, 3, 1])));
    }

    #[test]
    fn moved_missing_is_none() {
        assert_eq!(seq(&[1, 2]).moved(7, 0), None);
    }

    #[test]
    fn with_inserted_clamps() {
        assert_eq!(seq(&[4, 5]).with_inserted(2, 99), seq(&[4, 5, 2]));
        assert_eq!(seq(&[4, 5]).with_inserted(2, 0), seq(&[2, 4, 5]));
    }

    #[test]
    fn updates_do_not_touch_the_original() {
        let original = seq(&[1, 2, 3]);
        let _ = original.without(2);
        let _ = original.with_appended(9);
        assert_eq!(original, seq(&[1, 2, 3]));
    }

    #[test]
    fn detects_duplicates() {
        assert!(seq(&[1, 2, 1]).has_duplicates());
        assert!(!seq(&[1, 2, 3]).has_duplicates());
    }

    #[test]
    fn encodes_as_a_plain_array() {
        let original = seq(&[3, 1, 2]);

        let mut sequence_bytes = Vec::new();
        ciborium::into_writer(&original, &mut sequence_bytes).unwrap();
        let mut vec_bytes = Vec::new();
        ciborium::into_writer(&Vec::from([3u32, 1, 2]), &mut vec_bytes).unwrap();
        assert_eq!(sequence_bytes, vec_bytes);

        let decoded: Sequence<u32> = ciborium::from_reader(sequence_bytes.as_slice()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn owned_iteration_keeps_order() {
        let collected: Vec<u32> = seq(&[5, 4, 6]).into_iter().collect();
        assert_eq!(collected, vec![5, 4, 6]);
    }

    proptest! {
        #[test]
        fn moved_preserves_membership(
            len in 1usize..20,
            pick in any::<prop::sample::Index>(),
            to in 0usize..25,
        ) {
            let original: Sequence<u32> = (0..len as u32).collect();
            let id = pick.get(original.as_slice()).to_owned();

            let result = original.moved(id, to).unwrap();

            prop_assert_eq!(result.len(), original.len());
            let mut sorted = result.clone().into_vec();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, original.clone().into_vec());
            prop_assert_eq!(result.position(id), Some(to.min(len - 1)));
        }
    }
}

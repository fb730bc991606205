//! A `std::vec::Vec`, but 1-indexed instead of 0-indexed.

use std::ops::Index;
use std::ops::IndexMut;

/// Like a `std::vec::Vec`, but 1-indexed instead of 0-indexed. Index 0 never holds an element;
/// `get(0)` answers `None` rather than panicking, since indices usually come from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OneIndexedVec<T> {
    vec: Vec<T>,
}

impl<T> OneIndexedVec<T> {
    pub fn new() -> Self {
        OneIndexedVec { vec: Vec::new() }
    }

    /// Returns the element at the given index, or None if the index is 0 or out of bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        index.checked_sub(1).and_then(|i| self.vec.get(i))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        match index.checked_sub(1) {
            Some(i) => self.vec.get_mut(i),
            None => None,
        }
    }

    /// Appends an element and returns the (1-based) index it was stored at.
    pub fn push(&mut self, value: T) -> usize {
        self.vec.push(value);
        self.vec.len()
    }

    /// Returns the number of elements in the vector.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Returns true if the vector has a length of 0.
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Keeps the first `len` elements and drops the rest.
    pub fn truncate(&mut self, len: usize) {
        self.vec.truncate(len);
    }

    /// Returns an iterator over the elements, in index order.
    pub fn iter(&self) -> ::std::slice::Iter<T> {
        self.vec.iter()
    }

    /// Returns an iterator pairing each element with its 1-based index.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &T)> {
        self.vec.iter().enumerate().map(|(i, value)| (i + 1, value))
    }
}

impl<T> Index<usize> for OneIndexedVec<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        if index == 0 {
            panic!("index is 0");
        }
        &self.vec[index - 1]
    }
}

impl<T> IndexMut<usize> for OneIndexedVec<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        if index == 0 {
            panic!("index is 0");
        }
        &mut self.vec[index - 1]
    }
}

impl<T> From<Vec<T>> for OneIndexedVec<T> {
    fn from(vec: Vec<T>) -> Self {
        OneIndexedVec { vec }
    }
}

impl<'a, T> IntoIterator for &'a OneIndexedVec<T> {
    type Item = &'a T;
    type IntoIter = ::std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.vec.iter()
    }
}

#[cfg(test)]
mod test {
    use super::OneIndexedVec;

    #[test]
    fn index_zero_is_never_occupied() {
        let vec = OneIndexedVec::from(vec!['a', 'b']);
        assert_eq!(vec.get(0), None);
        assert_eq!(vec.get(1), Some(&'a'));
        assert_eq!(vec.get(2), Some(&'b'));
        assert_eq!(vec.get(3), None);
    }

    #[test]
    fn push_returns_one_based_index() {
        let mut vec = OneIndexedVec::new();
        assert_eq!(vec.push("first"), 1);
        assert_eq!(vec.push("second"), 2);
        assert_eq!(vec[2], "second");
        let indexed: Vec<_> = vec.indexed().collect();
        assert_eq!(indexed, vec![(1, &"first"), (2, &"second")]);
    }
}

//! See [`SeqBuf`].

use alloc::{boxed::Box, vec::Vec};

/// Rolling sequence buffer data structure.
///
/// This provides constant-time insertion, query, access, and removal of items
/// which have a monotonically increasing integer key, using two arrays of
/// length `N` (the capacity):
/// - `indices`, an array of keys
/// - `data`, an array of the `T`s holding the actual data
///
/// When accessing into this buffer using the key `k`, an index `i` is computed
/// using `k % N`. We store `k` at `indices[i]`, and store the actual `T` at
/// `data[i]`. This means that **multiple keys will map to the same index**, so
/// inserting a value and later inserting at `k + N` silently evicts the value
/// at `k`. When accessing a value we check that `indices[i] == k`, and only
/// then provide access to `data[i]`.
///
/// Callers must size `N` so that keys which need to be valid at the same time
/// never span more than `N` values.
///
/// All elements of `data` are always populated with valid values, so removing
/// an item only invalidates its index and leaves the value in place. If
/// `T: Default`, [`SeqBuf::with_capacity`] fills the data array with default
/// values.
///
/// [`u32::MAX`] is reserved as the empty marker, and can never be used as a
/// key.
///
/// # Examples
///
/// ```
/// use tether_transport::seq_buf::SeqBuf;
///
/// let mut buf = SeqBuf::<bool>::with_capacity(256);
/// buf.insert(3, true);
/// assert_eq!(Some(&true), buf.get(3));
///
/// // same slot, newer key
/// buf.insert(3 + 256, false);
/// assert_eq!(None, buf.get(3));
/// assert_eq!(Some(&false), buf.get(3 + 256));
/// ```
#[derive(Debug, Clone)]
pub struct SeqBuf<T> {
    indices: Box<[u32]>,
    data: Box<[T]>,
    len: usize,
}

const EMPTY: u32 = u32::MAX;

impl<T> SeqBuf<T> {
    /// Creates a new sequence buffer with `capacity` slots, populating the
    /// data array with items given by the callback.
    ///
    /// If `T: Default`, consider using [`SeqBuf::with_capacity`].
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` or `capacity > u32::MAX`.
    #[must_use]
    pub fn with_capacity_from_fn(capacity: usize, cb: impl FnMut(usize) -> T) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        assert!(
            u32::try_from(capacity).is_ok(),
            "capacity must fit into a u32"
        );
        Self {
            indices: alloc::vec![EMPTY; capacity].into_boxed_slice(),
            data: (0..capacity).map(cb).collect::<Vec<_>>().into_boxed_slice(),
            len: 0,
        }
    }

    /// Gets the number of slots in this buffer.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.indices.len()
    }

    /// Gets the number of elements in this sequence buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_transport::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String>::with_capacity(16);
    /// assert_eq!(0, buf.len());
    ///
    /// buf.insert(3, "hi #1".into());
    /// assert_eq!(1, buf.len());
    ///
    /// buf.insert(5, "bye".into());
    /// assert_eq!(2, buf.len());
    ///
    /// buf.insert(3, "hi #2".into());
    /// assert_eq!(2, buf.len());
    ///
    /// buf.remove(3);
    /// assert_eq!(1, buf.len());
    ///
    /// buf.remove(5);
    /// assert_eq!(0, buf.len());
    /// ```
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no elements in this sequence buffer.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn index(&self, key: u32) -> usize {
        // capacity fits into a u32, so the remainder fits into a usize
        (key % self.capacity_u32()) as usize
    }

    #[inline]
    #[expect(clippy::cast_possible_truncation, reason = "checked on construction")]
    const fn capacity_u32(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Returns `true` if there is a valid value stored at `key`.
    #[must_use]
    #[inline]
    pub fn contains(&self, key: u32) -> bool {
        key != EMPTY && self.indices[self.index(key)] == key
    }

    /// Gets a reference to the item at the given key.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_transport::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String>::with_capacity(16);
    /// assert!(buf.get(7).is_none());
    ///
    /// buf.insert(7, "hello world".into());
    /// assert_eq!("hello world", buf.get(7).unwrap());
    ///
    /// buf.remove(7);
    /// assert!(buf.get(7).is_none());
    /// ```
    #[must_use]
    #[inline]
    pub fn get(&self, key: u32) -> Option<&T> {
        if self.contains(key) {
            Some(&self.data[self.index(key)])
        } else {
            None
        }
    }

    /// Gets a mutable reference to the item at the given key.
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_transport::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String>::with_capacity(16);
    /// buf.insert(7, "hello world".into());
    ///
    /// *buf.get_mut(7).unwrap() = "goodbye world".into();
    /// assert_eq!("goodbye world", buf.get(7).unwrap());
    /// ```
    #[must_use]
    #[inline]
    pub fn get_mut(&mut self, key: u32) -> Option<&mut T> {
        if self.contains(key) {
            let index = self.index(key);
            Some(&mut self.data[index])
        } else {
            None
        }
    }

    /// Inserts a value into this buffer at the given key, overwriting any value
    /// previously stored at that key.
    ///
    /// This overwrites the value stored at the index `key % N`. For example,
    /// if `N = 16`, then all of the following keys write into the same index,
    /// and overwrite the same value:
    /// - 1
    /// - 17 (1 + 16)
    /// - 33 (1 + 16 + 16)
    ///
    /// Returns a reference to the newly inserted value.
    ///
    /// # Panics
    ///
    /// Panics if `key` is [`u32::MAX`].
    ///
    /// # Examples
    ///
    /// ```
    /// use tether_transport::seq_buf::SeqBuf;
    ///
    /// let mut buf = SeqBuf::<String>::with_capacity(16);
    /// let inserted = buf.insert(4, "hello world".into());
    /// assert_eq!("hello world", inserted);
    /// assert_eq!(1, buf.len());
    ///
    /// let inserted = buf.insert(4 + 16, "world".into());
    /// assert_eq!("world", inserted);
    /// assert_eq!(1, buf.len());
    /// assert!(buf.get(4).is_none());
    /// ```
    #[inline]
    pub fn insert(&mut self, key: u32, value: T) -> &mut T {
        assert_ne!(EMPTY, key, "`u32::MAX` is reserved as the empty marker");
        let index = self.index(key);
        let index_slot = &mut self.indices[index];
        if *index_slot == EMPTY {
            self.len += 1;
        }
        *index_slot = key;

        let data_slot = &mut self.data[index];
        *data_slot = value;
        data_slot
    }

    /// Invalidates the value stored at the given key.
    ///
    /// The value itself is left in the data array until it is overwritten by a
    /// later insert.
    ///
    /// Returns `true` if there was a valid value at `key`.
    #[inline]
    pub fn remove(&mut self, key: u32) -> bool {
        if self.contains(key) {
            let index = self.index(key);
            self.indices[index] = EMPTY;
            self.len -= 1;
            true
        } else {
            false
        }
    }
}

impl<T: Default> SeqBuf<T> {
    /// Creates a new sequence buffer with `capacity` slots, populating the
    /// data array with default values of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` or `capacity > u32::MAX`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_from_fn(capacity, |_| T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic = "capacity must be greater than 0"]
    fn zero_cap() {
        let _ = SeqBuf::<()>::with_capacity(0);
    }

    #[test]
    #[should_panic = "reserved as the empty marker"]
    fn insert_empty_marker() {
        let mut b = SeqBuf::<u32>::with_capacity(16);
        b.insert(u32::MAX, 0);
    }

    #[test]
    fn single() {
        let mut b = SeqBuf::<u32>::with_capacity(16);
        assert!(b.get(0).is_none());

        b.insert(0, 1234);
        assert_eq!(1234, *b.get(0).unwrap());
        assert_eq!(1234, *b.get_mut(0).unwrap());

        assert!(b.remove(0));
        assert!(b.get(0).is_none());
        assert!(b.get_mut(0).is_none());
        assert!(!b.remove(0));
    }

    #[test]
    fn keys_higher_than_cap() {
        let mut b = SeqBuf::<u32>::with_capacity(16);

        b.insert(10, 12);
        b.insert(15, 34);
        b.insert(16, 56);
        b.insert(17, 78);

        assert_eq!(12, *b.get(10).unwrap());
        assert_eq!(34, *b.get(15).unwrap());
        assert_eq!(56, *b.get(16).unwrap());
        assert_eq!(78, *b.get(17).unwrap());
        assert_eq!(4, b.len());
    }

    #[test]
    fn overwrite() {
        let mut b = SeqBuf::<u32>::with_capacity(16);

        b.insert(0, 111);
        b.insert(16, 222);

        // we lose `111` since we overwrite that slot with `222`
        assert!(b.get(0).is_none());
        assert!(!b.contains(0));
        assert_eq!(222, *b.get(16).unwrap());
        assert_eq!(1, b.len());

        // removing the stale key doesn't touch the newer one
        assert!(!b.remove(0));
        assert_eq!(222, *b.get(16).unwrap());
    }

    #[test]
    fn remove_keeps_value() {
        let mut b = SeqBuf::<u32>::with_capacity_from_fn(4, |i| u32::try_from(i).unwrap() * 10);
        b.insert(2, 7);
        b.remove(2);
        assert_eq!(7, b.data[2]);
        assert_eq!(30, b.data[3]);
    }

    #[test]
    fn empty_marker_lookups() {
        let b = SeqBuf::<u32>::with_capacity(16);
        assert!(b.get(u32::MAX).is_none());
        assert!(!b.contains(u32::MAX));
    }

    #[test]
    fn odd_capacity() {
        let mut b = SeqBuf::<u32>::with_capacity(3);
        for key in 0..10 {
            b.insert(key, key * 2);
        }
        assert_eq!(3, b.capacity());
        assert_eq!(3, b.len());
        assert!(b.get(6).is_none());
        assert_eq!(14, *b.get(7).unwrap());
        assert_eq!(18, *b.get(9).unwrap());
    }
}

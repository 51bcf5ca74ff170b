//! Generic ordered key/value container backing query arguments, cookies,
//! and POST form args.
//!
//! An append-only vector of byte-pair entries with linear scan. Insertion
//! order is preserved; `set` overwrites the first matching key in place.
//! Capacity is retained across [`ArgMap::reset`] to avoid re-allocating on
//! every request, the same way [`crate::http::types::HeaderMap`] and
//! [`crate::http::types::Url`]'s internal vectors are reused.

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ArgMap {
    entries: Vec<(&'static [u8], &'static [u8])>,
}

impl ArgMap {
    #[inline(always)]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Clears all entries, retaining the backing allocation.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Appends `(key, value)` unconditionally, even if `key` is already
    /// present.
    #[inline(always)]
    pub fn add(&mut self, key: &'static [u8], value: &'static [u8]) {
        self.entries.push((key, value));
    }

    /// Overwrites the first entry whose key matches `key`; if none match,
    /// appends. Entries after the first match, if any, are left as-is
    /// (mirrors `set` leaving duplicates beyond the first untouched).
    pub fn set(&mut self, key: &'static [u8], value: &'static [u8]) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes the first entry whose key matches `key`. Returns whether an
    /// entry was removed.
    pub fn del(&mut self, key: &[u8]) -> bool {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Returns the value of the first entry matching `key`.
    #[inline(always)]
    pub fn peek(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Returns every value whose key matches `key`, in insertion order.
    pub fn peek_all<'s>(&'s self, key: &'s [u8]) -> impl Iterator<Item = &'s [u8]> + 's {
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    #[inline(always)]
    pub fn has(&self, key: &[u8]) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates all entries in insertion order.
    #[inline(always)]
    pub fn visit(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|&(k, v)| (k, v))
    }

    /// Copies every entry into `dest`, preserving order.
    pub fn copy_to(&self, dest: &mut ArgMap) {
        dest.entries.extend_from_slice(&self.entries);
    }
}

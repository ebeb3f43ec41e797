//! Sparse memory image

use std::collections::BTreeMap;
use std::ops::RangeBounds;

/// Value of erased flash
pub const ERASED: u8 = 0xFF;

/// Address-keyed memory image that only stores written bytes
///
/// Reads of absent addresses return the default value. Iteration is always
/// in ascending address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseImage {
    memory: BTreeMap<u64, u8>,
    default_value: u8,
}

impl Default for SparseImage {
    fn default() -> Self {
        Self::new(ERASED)
    }
}

impl SparseImage {
    /// Create an empty image with the given fill value
    pub fn new(default_value: u8) -> Self {
        Self {
            memory: BTreeMap::new(),
            default_value,
        }
    }

    /// Create an image holding `data` at `start`
    pub fn from_bytes(start: u64, data: &[u8], default_value: u8) -> Self {
        let mut image = Self::new(default_value);
        image.write(start, data);
        image
    }

    /// Number of present bytes
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether no byte is present
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Value returned for absent addresses
    pub fn default_value(&self) -> u8 {
        self.default_value
    }

    /// Change the value returned for absent addresses
    pub fn set_default_value(&mut self, value: u8) {
        self.default_value = value;
    }

    /// Value at `address`, or the default value
    pub fn get(&self, address: u64) -> u8 {
        self.memory
            .get(&address)
            .copied()
            .unwrap_or(self.default_value)
    }

    /// Value at `address` only if it is present
    pub fn get_present(&self, address: u64) -> Option<u8> {
        self.memory.get(&address).copied()
    }

    /// Whether `address` is present
    pub fn contains(&self, address: u64) -> bool {
        self.memory.contains_key(&address)
    }

    /// Store one byte
    pub fn insert(&mut self, address: u64, value: u8) {
        self.memory.insert(address, value);
    }

    /// Store `data` starting at `start`
    pub fn write(&mut self, start: u64, data: &[u8]) {
        for (address, value) in (start..).zip(data) {
            self.memory.insert(address, *value);
        }
    }

    /// Fill `buf` from `start`, using the default value for gaps
    pub fn read(&self, start: u64, buf: &mut [u8]) {
        for (address, slot) in (start..).zip(buf.iter_mut()) {
            *slot = self.get(address);
        }
    }

    /// Present bytes in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u8)> + '_ {
        self.memory.iter().map(|(a, v)| (*a, *v))
    }

    /// Present bytes within `range`, ascending
    pub fn range<R: RangeBounds<u64>>(&self, range: R) -> impl Iterator<Item = (u64, u8)> + '_ {
        self.memory.range(range).map(|(a, v)| (*a, *v))
    }

    /// Lowest present address
    pub fn min_address(&self) -> Option<u64> {
        self.memory.keys().next().copied()
    }

    /// Highest present address
    pub fn max_address(&self) -> Option<u64> {
        self.memory.keys().next_back().copied()
    }

    /// Contiguous runs of present bytes as `(start, data)`
    pub fn segments(&self) -> Vec<(u64, Vec<u8>)> {
        let mut segments: Vec<(u64, Vec<u8>)> = Vec::new();
        for (address, value) in self.iter() {
            match segments.last_mut() {
                Some((start, data)) if *start + data.len() as u64 == address => data.push(value),
                _ => segments.push((address, vec![value])),
            }
        }
        segments
    }
}

impl FromIterator<(u64, u8)> for SparseImage {
    fn from_iter<I: IntoIterator<Item = (u64, u8)>>(iter: I) -> Self {
        let mut image = Self::default();
        image.extend(iter);
        image
    }
}

impl Extend<(u64, u8)> for SparseImage {
    fn extend<I: IntoIterator<Item = (u64, u8)>>(&mut self, iter: I) {
        self.memory.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fill_and_order() {
        let mut image = SparseImage::new(0xFF);
        image.insert(4, 0xAB);
        image.insert(0, 0x12);
        image.insert(1, 0x34);

        assert_eq!(image.get(2), 0xFF);
        assert_eq!(image.get_present(2), None);
        let addresses: Vec<u64> = image.iter().map(|(a, _)| a).collect();
        assert_eq!(addresses, vec![0, 1, 4]);

        let mut buf = [0u8; 6];
        image.read(0, &mut buf);
        assert_eq!(buf, [0x12, 0x34, 0xFF, 0xFF, 0xAB, 0xFF]);
    }

    #[test]
    fn test_segments() {
        let mut image = SparseImage::from_bytes(0x10, &[1, 2, 3], 0x00);
        image.write(0x20, &[4]);
        image.insert(0x13, 5);
        assert_eq!(
            image.segments(),
            vec![(0x10, vec![1, 2, 3, 5]), (0x20, vec![4])]
        );
        assert_eq!(image.min_address(), Some(0x10));
        assert_eq!(image.max_address(), Some(0x20));
        assert_eq!(image.range(0x11..0x14).count(), 3);
    }
}

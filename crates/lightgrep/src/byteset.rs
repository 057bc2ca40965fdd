//! 256-bit byte sets used as instruction operands

/// Set of byte values, one bit per value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteSet([u64; 4]);

impl ByteSet {
    /// Set containing no bytes
    pub const fn empty() -> Self {
        ByteSet([0; 4])
    }

    /// Set containing every byte value
    pub const fn full() -> Self {
        ByteSet([u64::MAX; 4])
    }

    /// Set containing exactly `b`
    pub fn single(b: u8) -> Self {
        let mut set = Self::empty();
        set.insert(b);
        set
    }

    /// Set containing every byte in `lo..=hi`
    pub fn range(lo: u8, hi: u8) -> Self {
        let mut set = Self::empty();
        for b in lo..=hi {
            set.insert(b);
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, b: u8) {
        self.0[(b >> 6) as usize] |= 1u64 << (b & 63);
    }

    #[inline]
    pub fn contains(&self, b: u8) -> bool {
        self.0[(b >> 6) as usize] & (1u64 << (b & 63)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Little-endian bitmap, bit `b` of byte `b / 8` set when `b` is a member
    pub fn to_bitmap(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, word) in self.0.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_bitmap(bits: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut le = [0u8; 8];
            le.copy_from_slice(&bits[i * 8..i * 8 + 8]);
            *word = u64::from_le_bytes(le);
        }
        ByteSet(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let set = ByteSet::range(b'a', b'c');
        assert!(set.contains(b'a'));
        assert!(set.contains(b'c'));
        assert!(!set.contains(b'd'));
        assert!(ByteSet::full().contains(0xFF));
        assert!(ByteSet::empty().is_empty());
    }

    #[test]
    fn test_bitmap_layout() {
        let set = ByteSet::single(9);
        let bits = set.to_bitmap();
        assert_eq!(bits[1], 0b10);
        assert_eq!(ByteSet::from_bitmap(&bits), set);
    }
}

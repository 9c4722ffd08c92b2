use std::fmt;

/// Half-open range of heap block numbers, `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start < end, "empty block range {}..{}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn blocks(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.end)
    }
}

/// Physical location of a row version: heap block plus line pointer.
///
/// Slots are 1-based, blocks are 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TupleAddress {
    pub block: u64,
    pub slot: u32,
}

impl TupleAddress {
    pub fn new(block: u64, slot: u32) -> Self {
        Self { block, slot }
    }

    /// Text form of a `tid` value, e.g. `(12070712,36)`.
    pub fn to_tid_literal(&self) -> String {
        format!("({},{})", self.block, self.slot)
    }
}

impl fmt::Display for TupleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bl:{} Re:{}", self.block, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tid_literal() {
        assert_eq!(TupleAddress::new(12070712, 36).to_tid_literal(), "(12070712,36)");
        assert_eq!(TupleAddress::new(0, 1).to_tid_literal(), "(0,1)");
    }

    #[test]
    fn test_block_range_iterates_half_open() {
        let range = BlockRange::new(4, 7);
        assert_eq!(range.len(), 3);
        assert_eq!(range.blocks().collect::<Vec<_>>(), vec![4, 5, 6]);
    }
}

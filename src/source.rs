use std::fmt;
use std::ops::Range;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)] // Default for convenience
pub struct Span {
    pub start: usize, // Byte offset
    pub end: usize,   // Byte offset (exclusive)
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    // Helper to merge two spans (e.g., for lists)
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Byte range for `ariadne` labels.
    pub fn to_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_covers_both() {
        let merged = Span::new(4, 6).merge(&Span::new(1, 3));
        assert_eq!(merged, Span::new(1, 6));
        assert_eq!(merged.to_range(), 1..6);
        assert_eq!(merged.to_string(), "1..6");
    }
}

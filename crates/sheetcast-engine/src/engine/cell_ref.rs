//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "B2", "AA100") and zero-indexed row/column coordinates, plus
//! scanning of formula text for reference tokens.
//!
//! # Examples
//!
//! ```ignore
//! let cell = CellRef::parse("B3").unwrap();
//! assert_eq!(cell.row, 2);  // 0-indexed
//! assert_eq!(cell.col, 1);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A reference to a cell by row and column indices (0-indexed).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(row: usize, col: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a cell reference from spreadsheet notation (e.g., "A1", "B2", "AA10").
    /// Returns None if the input is invalid.
    pub fn parse(name: &str) -> Option<CellRef> {
        let re = Regex::new(r"^(?<letters>[A-Za-z]+)(?<numbers>[0-9]+)$").unwrap();
        let caps = re.captures(name)?;
        Self::from_parts(&caps["letters"], &caps["numbers"])
    }

    fn from_parts(letters: &str, numbers: &str) -> Option<CellRef> {
        let mut col_acc = 0usize;
        for c in letters.to_ascii_uppercase().bytes() {
            let digit = (c - b'A') as usize + 1;
            col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
        }
        let col = col_acc.checked_sub(1)?;

        let row = numbers.parse::<usize>().ok()?.checked_sub(1)?;

        Some(CellRef::new(row, col))
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row + 1)
    }
}

/// An inclusive rectangular range of cells (e.g., "A1:B2").
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    pub fn new(start: CellRef, end: CellRef) -> CellRange {
        CellRange { start, end }
    }

    /// Parse a range from spreadsheet notation ("A1:B2"). A single reference
    /// without a colon is a one-cell range. Returns None when invalid.
    pub fn parse(name: &str) -> Option<CellRange> {
        match name.split_once(':') {
            Some((start, end)) => Some(CellRange::new(CellRef::parse(start)?, CellRef::parse(end)?)),
            None => {
                let cell = CellRef::parse(name)?;
                Some(CellRange::new(cell, cell))
            }
        }
    }

    /// All covered coordinates in row-major order.
    pub fn cells(&self) -> Vec<CellRef> {
        let mut out = Vec::new();
        for row in self.start.row..=self.end.row {
            for col in self.start.col..=self.end.col {
                out.push(CellRef::new(row, col));
            }
        }
        out
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Scan formula text for cell and range reference tokens.
///
/// Returns each token's byte span together with the coordinates it covers
/// (row-major for ranges). Only uppercase references are recognized, matching
/// the convention formulas are written in.
pub fn scan_formula_refs(text: &str) -> Vec<(Range<usize>, Vec<CellRef>)> {
    let re = Regex::new(r"\b([A-Z]+)([0-9]+)(?::([A-Z]+)([0-9]+))?\b").unwrap();
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        let token = caps.get(0).unwrap();
        let Some(start) = CellRef::from_parts(&caps[1], &caps[2]) else {
            continue;
        };
        let cells = match (caps.get(3), caps.get(4)) {
            (Some(letters), Some(numbers)) => {
                let Some(end) = CellRef::from_parts(letters.as_str(), numbers.as_str()) else {
                    continue;
                };
                CellRange::new(start, end).cells()
            }
            _ => vec![start],
        };
        out.push((token.start()..token.end(), cells));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{CellRange, CellRef, scan_formula_refs};

    #[test]
    fn test_parse_a1_overflow_returns_none() {
        let huge = format!("{}1", "Z".repeat(40));
        assert!(CellRef::parse(&huge).is_none());
    }

    #[test]
    fn test_col_to_letters_handles_max_usize() {
        let letters = CellRef::col_to_letters(usize::MAX);
        assert!(!letters.is_empty());
        assert!(letters.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_parse_roundtrip() {
        let cell = CellRef::parse("AA10").unwrap();
        assert_eq!(cell, CellRef::new(9, 26));
        assert_eq!(cell.to_string(), "AA10");
    }

    #[test]
    fn test_range_cells_row_major() {
        let range = CellRange::parse("B2:C3").unwrap();
        assert_eq!(
            range.cells(),
            vec![
                CellRef::new(1, 1),
                CellRef::new(1, 2),
                CellRef::new(2, 1),
                CellRef::new(2, 2),
            ]
        );
    }

    #[test]
    fn test_scan_formula_refs() {
        let refs = scan_formula_refs("=SUM(B2:B3)+C1");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].0, 5..10);
        assert_eq!(refs[0].1, vec![CellRef::new(1, 1), CellRef::new(2, 1)]);
        assert_eq!(refs[1].0, 12..14);
        assert_eq!(refs[1].1, vec![CellRef::new(0, 2)]);
    }
}

//! Decoded marker glyphs.
//!
//! A `Glyph` is the 5x5 binary cell matrix read from a marker. Cells are
//! stored as raw `0`/`1` bytes because that is exactly what goes out on the
//! serial link.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Cells per glyph side.
pub const GRID_SIZE: usize = 5;

/// Minimum decode confidence for a glyph to enter the debounce history.
pub const MIN_CONFIDENCE: f32 = 0.6;

/// Immutable 5x5 binary glyph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Glyph {
    cells: [[u8; GRID_SIZE]; GRID_SIZE],
}

impl Glyph {
    /// Build a glyph from rows. Every cell must be 0 or 1.
    pub fn new(cells: [[u8; GRID_SIZE]; GRID_SIZE]) -> Result<Self> {
        for (row, values) in cells.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                if *value > 1 {
                    return Err(anyhow!(
                        "glyph cell ({}, {}) must be 0 or 1, got {}",
                        row,
                        col,
                        value
                    ));
                }
            }
        }
        Ok(Self { cells })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn cell(&self, row: usize, col: usize) -> u8 {
        self.cells[row][col]
    }

    pub fn is_set(&self, row: usize, col: usize) -> bool {
        self.cells[row][col] != 0
    }

    pub fn row(&self, row: usize) -> &[u8; GRID_SIZE] {
        &self.cells[row]
    }

    pub fn rows(&self) -> &[[u8; GRID_SIZE]; GRID_SIZE] {
        &self.cells
    }

    /// Returns a copy with one cell toggled.
    pub fn with_flipped(mut self, row: usize, col: usize) -> Self {
        self.cells[row][col] ^= 1;
        self
    }

    /// Number of cells that differ between two glyphs.
    pub fn hamming_distance(&self, other: &Glyph) -> usize {
        self.cells
            .iter()
            .flatten()
            .zip(other.cells.iter().flatten())
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Comma separated row form, e.g. `10101,00000,00100,00000,10101`.
    pub fn to_row_string(&self) -> String {
        self.cells
            .iter()
            .map(|row| row.iter().map(|c| if *c != 0 { '1' } else { '0' }).collect::<String>())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for Glyph {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let rows: Vec<&str> = s.split(',').map(|row| row.trim()).collect();
        if rows.len() != GRID_SIZE {
            return Err(anyhow!(
                "glyph needs {} rows separated by ',', got {}",
                GRID_SIZE,
                rows.len()
            ));
        }
        let mut cells = [[0u8; GRID_SIZE]; GRID_SIZE];
        for (i, row) in rows.iter().enumerate() {
            if row.chars().count() != GRID_SIZE {
                return Err(anyhow!(
                    "glyph row {} must have {} cells, got '{}'",
                    i,
                    GRID_SIZE,
                    row
                ));
            }
            for (j, ch) in row.chars().enumerate() {
                cells[i][j] = match ch {
                    '0' => 0,
                    '1' => 1,
                    other => return Err(anyhow!("invalid glyph cell '{}' in row {}", other, i)),
                };
            }
        }
        Ok(Self { cells })
    }
}

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for cell in row {
                write!(f, "{}", if *cell != 0 { '#' } else { '.' })?;
            }
        }
        Ok(())
    }
}

/// Glyph plus the decoder's confidence in it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphReading {
    pub glyph: Glyph,
    pub confidence: f32,
}

impl GlyphReading {
    pub fn new(glyph: Glyph, confidence: f32) -> Self {
        Self { glyph, confidence }
    }

    pub fn meets(&self, min_confidence: f32) -> bool {
        self.confidence >= min_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_binary_cells() {
        let mut cells = [[0u8; GRID_SIZE]; GRID_SIZE];
        cells[2][3] = 2;
        assert!(Glyph::new(cells).is_err());
    }

    #[test]
    fn parses_row_form() {
        let glyph: Glyph = "10101,00000,00100,00000,10101".parse().unwrap();
        assert_eq!(glyph.row(0), &[1, 0, 1, 0, 1]);
        assert!(glyph.is_set(2, 2));
        assert!(!glyph.is_set(1, 1));
        assert_eq!(glyph.to_row_string(), "10101,00000,00100,00000,10101");
    }

    #[test]
    fn parse_rejects_bad_shape() {
        assert!("10101,00000".parse::<Glyph>().is_err());
        assert!("1010,00000,00100,00000,10101".parse::<Glyph>().is_err());
        assert!("10201,00000,00100,00000,10101".parse::<Glyph>().is_err());
    }

    #[test]
    fn display_draws_grid() {
        let glyph: Glyph = "10000,01000,00100,00010,00001".parse().unwrap();
        assert_eq!(glyph.to_string(), "#....\n.#...\n..#..\n...#.\n....#");
    }

    #[test]
    fn confidence_threshold_is_inclusive() {
        let glyph = Glyph::empty();
        assert!(GlyphReading::new(glyph, 0.6).meets(MIN_CONFIDENCE));
        assert!(!GlyphReading::new(glyph, 0.5999).meets(MIN_CONFIDENCE));
    }

    #[test]
    fn flip_changes_one_cell() {
        let glyph = Glyph::empty();
        let flipped = glyph.with_flipped(4, 0);
        assert_eq!(glyph.hamming_distance(&flipped), 1);
        assert_eq!(flipped.cell(4, 0), 1);
    }
}

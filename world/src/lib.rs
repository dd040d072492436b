#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Static obstacle grid used by Warden levels.
//!
//! [`TileGrid`] is the dense, bounded implementation of
//! [`ObstacleGrid`] that hosts build once at level load. Cells outside the
//! grid are reported as obstacles so that searches never wander off the map.

use thiserror::Error;
use warden_core::{CellCoord, ObstacleGrid, Vec2};

pub mod route;

const WALL_TILE: char = '#';
const FLOOR_TILE: char = '.';

/// Reasons an ASCII layout could not be turned into a grid.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LayoutError {
    /// The layout contained no rows.
    #[error("layout contains no rows")]
    Empty,
    /// A row's length differs from the first row's.
    #[error("row {row} has {found} tiles, expected {expected}")]
    Ragged {
        /// Zero-based row index.
        row: usize,
        /// Tile count of the first row.
        expected: usize,
        /// Tile count of the offending row.
        found: usize,
    },
    /// A character other than `#` or `.` appeared.
    #[error("unknown tile {tile:?} at row {row}, column {column}")]
    UnknownTile {
        /// Zero-based row index.
        row: usize,
        /// Zero-based column index.
        column: usize,
        /// Character that was not recognised.
        tile: char,
    },
    /// Cell size must be finite and positive.
    #[error("cell size {0} must be finite and positive")]
    InvalidCellSize(f32),
}

/// Dense obstacle layer covering a rectangular block of cells.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid {
    origin: Vec2,
    cell_size: f32,
    width: u32,
    height: u32,
    blocked: Vec<bool>,
}

impl TileGrid {
    /// Creates an obstacle-free grid whose cell `(0, 0)` starts at `origin`.
    pub fn new(width: u32, height: u32, cell_size: f32, origin: Vec2) -> Result<Self, LayoutError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(LayoutError::InvalidCellSize(cell_size));
        }

        let capacity_u64 = u64::from(width) * u64::from(height);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Ok(Self {
            origin,
            cell_size,
            width,
            height,
            blocked: vec![false; capacity],
        })
    }

    /// Parses a layout where `#` marks an obstacle and `.` a free cell.
    ///
    /// Line `n` of the layout becomes row `y = n`; blank lines are skipped so
    /// indented raw strings can be used directly.
    pub fn from_ascii(layout: &str, cell_size: f32) -> Result<Self, LayoutError> {
        let rows: Vec<&str> = layout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        Self::from_rows(&rows, cell_size)
    }

    /// Parses pre-split layout rows; see [`TileGrid::from_ascii`].
    pub fn from_rows<S: AsRef<str>>(rows: &[S], cell_size: f32) -> Result<Self, LayoutError> {
        let Some(first) = rows.first() else {
            return Err(LayoutError::Empty);
        };
        let expected = first.as_ref().chars().count();
        if expected == 0 {
            return Err(LayoutError::Empty);
        }

        let width = u32::try_from(expected).unwrap_or(u32::MAX);
        let height = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let mut grid = Self::new(width, height, cell_size, Vec2::ZERO)?;

        for (row_index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let found = row.chars().count();
            if found != expected {
                return Err(LayoutError::Ragged {
                    row: row_index,
                    expected,
                    found,
                });
            }

            for (column_index, tile) in row.chars().enumerate() {
                let blocked = match tile {
                    WALL_TILE => true,
                    FLOOR_TILE => false,
                    other => {
                        return Err(LayoutError::UnknownTile {
                            row: row_index,
                            column: column_index,
                            tile: other,
                        })
                    }
                };
                let cell = CellCoord::new(
                    i32::try_from(column_index).unwrap_or(i32::MAX),
                    i32::try_from(row_index).unwrap_or(i32::MAX),
                );
                grid.set_obstacle(cell, blocked);
            }
        }

        Ok(grid)
    }

    /// Marks or clears an obstacle. Cells outside the grid are ignored.
    ///
    /// Only level loading should call this; systems treat the grid as frozen.
    pub fn set_obstacle(&mut self, cell: CellCoord, blocked: bool) {
        if let Some(index) = self.index(cell) {
            if let Some(slot) = self.blocked.get_mut(index) {
                *slot = blocked;
            }
        }
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// World-space corner of cell `(0, 0)`.
    #[must_use]
    pub const fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Reports whether the cell lies inside the grid bounds.
    #[must_use]
    pub fn contains(&self, cell: CellCoord) -> bool {
        self.index(cell).is_some()
    }

    /// Iterator over every in-bounds free cell in row-major order.
    pub fn free_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        let width = self.width;
        self.blocked
            .iter()
            .enumerate()
            .filter(|(_, blocked)| !**blocked)
            .filter_map(move |(index, _)| {
                let index = u32::try_from(index).ok()?;
                let x = i32::try_from(index % width).ok()?;
                let y = i32::try_from(index / width).ok()?;
                Some(CellCoord::new(x, y))
            })
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        let column = u32::try_from(cell.x()).ok()?;
        let row = u32::try_from(cell.y()).ok()?;
        if column >= self.width || row >= self.height {
            return None;
        }

        let row = usize::try_from(row).ok()?;
        let column = usize::try_from(column).ok()?;
        let width = usize::try_from(self.width).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }
}

impl ObstacleGrid for TileGrid {
    fn has_obstacle(&self, cell: CellCoord) -> bool {
        self.index(cell)
            .and_then(|index| self.blocked.get(index).copied())
            .unwrap_or(true)
    }

    fn world_to_cell(&self, point: Vec2) -> CellCoord {
        let local = (point - self.origin) / self.cell_size;
        CellCoord::new(local.x.floor() as i32, local.y.floor() as i32)
    }

    fn cell_center_world(&self, cell: CellCoord) -> Vec2 {
        let corner = Vec2::new(cell.x() as f32, cell.y() as f32);
        self.origin + (corner + Vec2::splat(0.5)) * self.cell_size
    }

    fn cell_size(&self) -> f32 {
        self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_layout_marks_walls() {
        let grid = TileGrid::from_ascii(
            "
            ###
            #..
            ",
            1.0,
        )
        .expect("valid layout");

        assert_eq!((grid.width(), grid.height()), (3, 2));
        assert!(grid.has_obstacle(CellCoord::new(0, 0)));
        assert!(grid.has_obstacle(CellCoord::new(0, 1)));
        assert!(!grid.has_obstacle(CellCoord::new(1, 1)));
        assert!(!grid.has_obstacle(CellCoord::new(2, 1)));
    }

    #[test]
    fn cells_outside_bounds_are_obstacles() {
        let grid = TileGrid::new(2, 2, 1.0, Vec2::ZERO).expect("grid");
        assert!(!grid.has_obstacle(CellCoord::new(1, 1)));
        assert!(grid.has_obstacle(CellCoord::new(-1, 0)));
        assert!(grid.has_obstacle(CellCoord::new(2, 0)));
        assert!(grid.has_obstacle(CellCoord::new(0, 2)));
    }

    #[test]
    fn world_and_cell_conversions_agree() {
        let grid = TileGrid::new(4, 4, 2.0, Vec2::new(-4.0, -4.0)).expect("grid");
        let cell = grid.world_to_cell(Vec2::new(-3.9, 0.1));
        assert_eq!(cell, CellCoord::new(0, 2));
        assert_eq!(grid.cell_center_world(cell), Vec2::new(-3.0, 1.0));
        assert_eq!(grid.world_to_cell(grid.cell_center_world(cell)), cell);
    }

    #[test]
    fn ragged_layout_is_rejected() {
        let error = TileGrid::from_rows(&["...", ".."], 1.0).expect_err("ragged");
        assert_eq!(
            error,
            LayoutError::Ragged {
                row: 1,
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn unknown_tile_is_rejected() {
        let error = TileGrid::from_rows(&[".x."], 1.0).expect_err("unknown tile");
        assert_eq!(
            error,
            LayoutError::UnknownTile {
                row: 0,
                column: 1,
                tile: 'x'
            }
        );
    }

    #[test]
    fn non_positive_cell_size_is_rejected() {
        assert_eq!(
            TileGrid::new(1, 1, 0.0, Vec2::ZERO).expect_err("zero size"),
            LayoutError::InvalidCellSize(0.0)
        );
    }

    #[test]
    fn free_cells_skip_walls() {
        let grid = TileGrid::from_rows(&["#.", ".#"], 1.0).expect("layout");
        let free: Vec<_> = grid.free_cells().collect();
        assert_eq!(free, vec![CellCoord::new(1, 0), CellCoord::new(0, 1)]);
    }
}

//! Block-wise processing of large grids

use crate::cancel::CancelToken;
use crate::strategy::{ParallelStrategy, ProcessingMode};

/// A rectangular block of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Row offset in the source grid
    pub row_offset: usize,
    /// Column offset in the source grid
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    pub fn new(row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    /// Convert tile-local coordinates to source grid coordinates
    pub fn to_source_coords(&self, local_row: usize, local_col: usize) -> (usize, usize) {
        (self.row_offset + local_row, self.col_offset + local_col)
    }

    /// Source rows covered by this tile
    pub fn row_range(&self) -> std::ops::Range<usize> {
        self.row_offset..self.row_offset + self.rows
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator over tiles covering a grid in row-major order
#[derive(Debug, Clone)]
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
    current_row: usize,
    current_col: usize,
}

impl TileIterator {
    /// Tiles of at most `tile_rows x tile_cols` cells
    pub fn new(total_rows: usize, total_cols: usize, tile_rows: usize, tile_cols: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_rows: tile_rows.max(1),
            tile_cols: tile_cols.max(1),
            current_row: 0,
            current_col: 0,
        }
    }

    /// Full-width strips of at most `block_rows` rows
    pub fn row_blocks(total_rows: usize, total_cols: usize, block_rows: usize) -> Self {
        Self::new(total_rows, total_cols, block_rows, total_cols.max(1))
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_rows.min(self.total_rows - self.current_row);
        let cols = self.tile_cols.min(self.total_cols - self.current_col);
        let tile = Tile::new(self.current_row, self.current_col, rows, cols);

        self.current_col += self.tile_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_rows;
        }

        Some(tile)
    }
}

/// Summary of a block-wise run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRun {
    /// Blocks handed to the callback
    pub completed: usize,
    /// Blocks in the grid
    pub total: usize,
    /// Whether the run stopped on a cancellation request
    pub cancelled: bool,
}

/// Drives row-block processing with cancellation checks between blocks
#[derive(Debug, Clone, Copy)]
pub struct TiledProcessor {
    block_rows: usize,
    mode: ProcessingMode,
}

impl TiledProcessor {
    pub fn new(block_rows: usize) -> Self {
        Self {
            block_rows: block_rows.max(1),
            mode: ProcessingMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn block_rows(&self) -> usize {
        self.block_rows
    }

    /// Compute the rows of one block, in row order, using the processing mode
    pub fn map_rows<T, F>(&self, tile: &Tile, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.mode.par_map(tile.row_range(), f)
    }

    /// Visit the row blocks of a `rows x cols` grid in order.
    ///
    /// The token is checked before each block; once it is set no further
    /// block is started. Blocks already handed to `f` are left as they are.
    pub fn for_each_block<E, F>(
        &self,
        rows: usize,
        cols: usize,
        cancel: &CancelToken,
        mut f: F,
    ) -> Result<BlockRun, E>
    where
        F: FnMut(&Tile) -> Result<(), E>,
    {
        let blocks = TileIterator::row_blocks(rows, cols, self.block_rows);
        let total = blocks.clone().count();
        let mut completed = 0;

        for tile in blocks {
            if cancel.is_cancelled() {
                return Ok(BlockRun {
                    completed,
                    total,
                    cancelled: true,
                });
            }
            f(&tile)?;
            completed += 1;
        }

        Ok(BlockRun {
            completed,
            total,
            cancelled: false,
        })
    }
}

impl Default for TiledProcessor {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_iterator() {
        let tiles: Vec<_> = TileIterator::new(100, 100, 32, 32).collect();
        assert_eq!(tiles.len(), 16);
        assert_eq!(tiles[0], Tile::new(0, 0, 32, 32));
        assert_eq!(tiles[3], Tile::new(0, 96, 32, 4));
        assert_eq!(tiles[15], Tile::new(96, 96, 4, 4));
    }

    #[test]
    fn test_tile_coverage() {
        let rows = 37;
        let cols = 23;
        let mut covered = vec![vec![0u8; cols]; rows];

        for tile in TileIterator::new(rows, cols, 8, 5) {
            for r in 0..tile.rows {
                for c in 0..tile.cols {
                    let (sr, sc) = tile.to_source_coords(r, c);
                    covered[sr][sc] += 1;
                }
            }
        }

        for r in 0..rows {
            for c in 0..cols {
                assert_eq!(covered[r][c], 1, "Cell ({}, {}) covered {} times", r, c, covered[r][c]);
            }
        }
    }

    #[test]
    fn test_row_blocks() {
        let blocks: Vec<_> = TileIterator::row_blocks(10, 7, 4).collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|t| t.col_offset == 0 && t.cols == 7));
        assert_eq!(blocks[2].rows, 2);
        assert_eq!(TileIterator::row_blocks(0, 7, 4).count(), 0);
    }

    #[test]
    fn test_for_each_block_stops_on_cancel() {
        let cancel = CancelToken::new();
        let processor = TiledProcessor::new(2);
        let mut seen = Vec::new();
        let run = processor
            .for_each_block::<(), _>(10, 3, &cancel, |tile| {
                seen.push(tile.row_offset);
                if tile.row_offset == 2 {
                    cancel.cancel();
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![0, 2]);
        assert_eq!(run, BlockRun { completed: 2, total: 5, cancelled: true });
    }

    #[test]
    fn test_for_each_block_propagates_errors() {
        let processor = TiledProcessor::new(3);
        let result = processor.for_each_block(9, 1, &CancelToken::new(), |tile| {
            if tile.row_offset == 3 {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_map_rows() {
        let processor = TiledProcessor::new(4).with_mode(ProcessingMode::Sequential);
        let tile = Tile::new(4, 0, 3, 10);
        assert_eq!(processor.map_rows(&tile, |r| r * 10), vec![40, 50, 60]);
    }
}

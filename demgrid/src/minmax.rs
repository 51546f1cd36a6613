use crate::C;

/// Pyramidal index of elevation extrema over a tile's cell grid.
///
/// Level 0 holds the min/max of the four corner nodes of every cell of
/// the raster. Each level above halves both dimensions, merging up to
/// four children into one extremum pair, until a single root cell
/// remains. The tree lets a ray/DEM intersector skip whole regions a ray
/// cannot possibly hit.
pub struct MinMaxTree {
    levels: Vec<Level>,
}

struct Level {
    rows: usize,
    cols: usize,
    min: Box<[C]>,
    max: Box<[C]>,
}

/// One tree node: the cell block it covers and its elevation extrema.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    /// First cell row covered by the node.
    pub min_sub_row: usize,
    /// First cell column covered by the node.
    pub min_sub_col: usize,
    /// Number of cell rows covered.
    pub sub_rows: usize,
    /// Number of cell columns covered.
    pub sub_cols: usize,
    /// Lowest node elevation in the block.
    pub e_min: C,
    /// Highest node elevation in the block.
    pub e_max: C,
}

impl MinMaxTree {
    /// Builds the tree from a raster of `rows` x `cols` elevation nodes
    /// in row-major order (row 0 = southernmost). Requires at least two
    /// rows and columns.
    pub fn new(elevations: &[C], rows: usize, cols: usize) -> Self {
        assert!(rows >= 2 && cols >= 2);
        assert_eq!(elevations.len(), rows * cols);

        let cell_rows = rows - 1;
        let cell_cols = cols - 1;
        let mut min = vec![0.0; cell_rows * cell_cols].into_boxed_slice();
        let mut max = vec![0.0; cell_rows * cell_cols].into_boxed_slice();
        for i in 0..cell_rows {
            for j in 0..cell_cols {
                let z00 = elevations[i * cols + j];
                let z01 = elevations[i * cols + j + 1];
                let z10 = elevations[(i + 1) * cols + j];
                let z11 = elevations[(i + 1) * cols + j + 1];
                min[i * cell_cols + j] = z00.min(z01).min(z10).min(z11);
                max[i * cell_cols + j] = z00.max(z01).max(z10).max(z11);
            }
        }

        let mut levels = vec![Level {
            rows: cell_rows,
            cols: cell_cols,
            min,
            max,
        }];

        while levels.last().map_or(false, |l| l.rows > 1 || l.cols > 1) {
            let child = levels.last().unwrap();
            let rows = child.rows.div_ceil(2);
            let cols = child.cols.div_ceil(2);
            let mut min = vec![C::INFINITY; rows * cols].into_boxed_slice();
            let mut max = vec![C::NEG_INFINITY; rows * cols].into_boxed_slice();
            for i in 0..child.rows {
                for j in 0..child.cols {
                    let k = (i / 2) * cols + j / 2;
                    min[k] = min[k].min(child.min[i * child.cols + j]);
                    max[k] = max[k].max(child.max[i * child.cols + j]);
                }
            }
            levels.push(Level {
                rows,
                cols,
                min,
                max,
            });
        }

        Self { levels }
    }

    /// Number of levels, root included.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Extrema of the root node, i.e. of the whole raster.
    pub fn root(&self) -> Node {
        let base = &self.levels[0];
        let top = self.levels.last().unwrap();
        Node {
            min_sub_row: 0,
            min_sub_col: 0,
            sub_rows: base.rows,
            sub_cols: base.cols,
            e_min: top.min[0],
            e_max: top.max[0],
        }
    }

    /// The deepest level at which the two cells fall in the same node.
    ///
    /// Level 0 means the cells are identical.
    pub fn merge_level(&self, cell1: (usize, usize), cell2: (usize, usize)) -> usize {
        for level in 0..self.levels.len() {
            if (cell1.0 >> level, cell1.1 >> level) == (cell2.0 >> level, cell2.1 >> level) {
                return level;
            }
        }
        // the root is 1x1, so every pair merges at the top
        self.levels.len() - 1
    }

    /// Lowest elevation of the level-`level` node containing `cell`.
    pub fn min_elevation(&self, cell: (usize, usize), level: usize) -> C {
        let l = &self.levels[level];
        l.min[(cell.0 >> level) * l.cols + (cell.1 >> level)]
    }

    /// Highest elevation of the level-`level` node containing `cell`.
    pub fn max_elevation(&self, cell: (usize, usize), level: usize) -> C {
        let l = &self.levels[level];
        l.max[(cell.0 >> level) * l.cols + (cell.1 >> level)]
    }

    /// Full description of the level-`level` node containing `cell`.
    pub fn node(&self, cell: (usize, usize), level: usize) -> Node {
        let base = &self.levels[0];
        let block = 1usize << level;
        let min_sub_row = (cell.0 >> level) << level;
        let min_sub_col = (cell.1 >> level) << level;
        Node {
            min_sub_row,
            min_sub_col,
            sub_rows: block.min(base.rows - min_sub_row),
            sub_cols: block.min(base.cols - min_sub_col),
            e_min: self.min_elevation(cell, level),
            e_max: self.max_elevation(cell, level),
        }
    }

    /// Node boundaries of `level` blocks strictly between two cells.
    ///
    /// Returns the raster node indices (grid lines) separating the
    /// level-`level` blocks on the way from `from` to `to`, ordered along
    /// the direction of travel. Works on one axis; callers pass row or
    /// column indices.
    pub fn crossings(&self, from: usize, to: usize, level: usize) -> Vec<usize> {
        let block = 1usize << level;
        let (lo, hi) = (from.min(to), from.max(to));
        let first = (lo / block + 1) * block;
        let mut lines: Vec<usize> = (first..=hi).step_by(block).collect();
        if from > to {
            lines.reverse();
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(rows: usize, cols: usize, f: impl Fn(usize, usize) -> C) -> Vec<C> {
        let mut e = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                e.push(f(i, j));
            }
        }
        e
    }

    #[test]
    fn single_cell_raster() {
        let tree = MinMaxTree::new(&[1.0, 2.0, 3.0, 4.0], 2, 2);
        assert_eq!(tree.levels(), 1);
        let root = tree.root();
        assert_eq!(root.e_min, 1.0);
        assert_eq!(root.e_max, 4.0);
        assert_eq!((root.sub_rows, root.sub_cols), (1, 1));
    }

    #[test]
    fn merge_level_is_symmetric_and_monotone() {
        let e = raster(17, 33, |i, j| (i * 31 + j * 7) as C);
        let tree = MinMaxTree::new(&e, 17, 33);
        assert_eq!(tree.merge_level((3, 5), (3, 5)), 0);
        assert_eq!(
            tree.merge_level((0, 0), (15, 31)),
            tree.merge_level((15, 31), (0, 0))
        );
        // adjacent cells across a power-of-two boundary only merge higher up
        assert!(tree.merge_level((7, 0), (8, 0)) > tree.merge_level((8, 0), (9, 0)));
    }

    #[test]
    fn extrema_bound_every_cell_at_every_level() {
        let e = raster(21, 19, |i, j| ((i * 13 + j * 17) % 29) as C - 7.0);
        let tree = MinMaxTree::new(&e, 21, 19);
        for ci in 0..20 {
            for cj in 0..18 {
                let cell_min = [(0, 0), (0, 1), (1, 0), (1, 1)]
                    .iter()
                    .map(|&(di, dj)| e[(ci + di) * 19 + cj + dj])
                    .fold(C::INFINITY, C::min);
                let cell_max = [(0, 0), (0, 1), (1, 0), (1, 1)]
                    .iter()
                    .map(|&(di, dj)| e[(ci + di) * 19 + cj + dj])
                    .fold(C::NEG_INFINITY, C::max);
                for level in 0..tree.levels() {
                    assert!(tree.min_elevation((ci, cj), level) <= cell_min);
                    assert!(tree.max_elevation((ci, cj), level) >= cell_max);
                }
            }
        }
    }

    #[test]
    fn crossings_are_ordered_along_travel() {
        let e = raster(18, 18, |_, _| 0.0);
        let tree = MinMaxTree::new(&e, 18, 18);
        assert_eq!(tree.crossings(1, 9, 2), vec![4, 8]);
        assert_eq!(tree.crossings(9, 1, 2), vec![8, 4]);
        assert_eq!(tree.crossings(4, 5, 0), vec![5]);
        assert!(tree.crossings(5, 5, 1).is_empty());
        // a crossing exactly on a block edge belongs to the far side
        assert_eq!(tree.crossings(3, 4, 2), vec![4]);
    }

    #[test]
    fn storage_stays_within_twice_the_cell_count() {
        let e = raster(257, 257, |i, j| (i + j) as C);
        let tree = MinMaxTree::new(&e, 257, 257);
        let total: usize = tree.levels.iter().map(|l| l.rows * l.cols).sum();
        assert!(total <= 2 * 256 * 256);
    }
}

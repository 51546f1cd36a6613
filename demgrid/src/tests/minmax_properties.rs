use crate::{MinMaxTree, C};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_raster(rng: &mut StdRng, rows: usize, cols: usize) -> Vec<C> {
    (0..rows * cols).map(|_| rng.gen_range(-500.0..9000.0)).collect()
}

/// The tree must never under- or over-estimate, whatever the raster
/// shape. Sampled rather than exhaustive across many shapes.
#[test]
fn random_rasters_never_escape_their_bounds() {
    let mut rng = StdRng::seed_from_u64(0xe12e_f744_f224_cf43);
    for _ in 0..20 {
        let rows = rng.gen_range(2..60);
        let cols = rng.gen_range(2..60);
        let raster = random_raster(&mut rng, rows, cols);
        let tree = MinMaxTree::new(&raster, rows, cols);
        for _ in 0..200 {
            let i = rng.gen_range(0..rows - 1);
            let j = rng.gen_range(0..cols - 1);
            let mut lo = C::INFINITY;
            let mut hi = C::NEG_INFINITY;
            for (di, dj) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                lo = lo.min(raster[(i + di) * cols + j + dj]);
                hi = hi.max(raster[(i + di) * cols + j + dj]);
            }
            let level = rng.gen_range(0..tree.levels());
            assert!(tree.min_elevation((i, j), level) <= lo);
            assert!(tree.max_elevation((i, j), level) >= hi);
        }
    }
}

/// A node's extrema are exactly the extrema of the raster nodes its cell
/// block covers.
#[test]
fn node_extrema_are_tight() {
    let mut rng = StdRng::seed_from_u64(42);
    let (rows, cols) = (34, 27);
    let raster = random_raster(&mut rng, rows, cols);
    let tree = MinMaxTree::new(&raster, rows, cols);
    for _ in 0..100 {
        let cell = (rng.gen_range(0..rows - 1), rng.gen_range(0..cols - 1));
        let level = rng.gen_range(0..tree.levels());
        let node = tree.node(cell, level);
        let mut lo = C::INFINITY;
        let mut hi = C::NEG_INFINITY;
        for i in node.min_sub_row..node.min_sub_row + node.sub_rows {
            for j in node.min_sub_col..node.min_sub_col + node.sub_cols {
                for (di, dj) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    lo = lo.min(raster[(i + di) * cols + j + dj]);
                    hi = hi.max(raster[(i + di) * cols + j + dj]);
                }
            }
        }
        assert_eq!(node.e_min, lo);
        assert_eq!(node.e_max, hi);
    }
}

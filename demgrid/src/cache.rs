use crate::{
    tile::{Location, Tile},
    DemError, C,
};
use log::debug;
use std::rc::Rc;

/// Callback filling freshly created tiles.
///
/// The cache creates the tile and hands it over; the updater must call
/// [`Tile::set_geometry`] once, choosing an extent that contains the
/// requested point, then set every elevation node. Sealing is the
/// cache's job. Implementations backed by files are expected to return
/// quickly (file mapping, not network).
pub trait TileUpdater {
    /// Fills `tile` so that it covers `(latitude, longitude)`.
    fn update_tile(&self, latitude: C, longitude: C, tile: &mut Tile) -> Result<(), DemError>;
}

struct Entry {
    key: (i64, i64),
    tile: Rc<Tile>,
    last_use: u64,
}

/// LRU store of sealed tiles loaded on demand through a [`TileUpdater`].
///
/// The first loaded tile establishes the grid: all subsequent tiles must
/// share its latitude and longitude steps and sit on the infinite grid
/// deduced from them. Handles are `Rc<Tile>` so that eviction never
/// invalidates a tile borrowed for the duration of one location call.
///
/// The cache is exclusively owned by one engine instance; concurrent
/// consumers allocate one engine (and thus one cache) per thread.
pub struct TileCache<U: TileUpdater> {
    updater: U,
    capacity: usize,
    entries: Vec<Entry>,
    // grid established by the first load
    latitude_step: C,
    longitude_step: C,
    origin_latitude: C,
    origin_longitude: C,
    extent_latitude: C,
    extent_longitude: C,
    use_counter: u64,
    accesses: u64,
    loads: u64,
}

impl<U: TileUpdater> TileCache<U> {
    /// A cache holding at most `capacity` tiles.
    pub fn new(capacity: usize, updater: U) -> Self {
        assert!(capacity >= 1, "tile cache capacity must be at least 1");
        Self {
            updater,
            capacity,
            entries: Vec::new(),
            latitude_step: 0.0,
            longitude_step: 0.0,
            origin_latitude: 0.0,
            origin_longitude: 0.0,
            extent_latitude: 0.0,
            extent_longitude: 0.0,
            use_counter: 0,
            accesses: 0,
            loads: 0,
        }
    }

    /// Total number of `get_tile` calls. The intersector compares this
    /// counter across one call to detect tiles ping-ponging forever.
    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    /// Number of tiles created and filled through the updater.
    pub fn loads(&self) -> u64 {
        self.loads
    }

    /// Returns the tile containing `(latitude, longitude)`, loading it
    /// through the updater on a miss.
    pub fn get_tile(&mut self, latitude: C, longitude: C) -> Result<Rc<Tile>, DemError> {
        self.accesses += 1;
        self.use_counter += 1;
        let stamp = self.use_counter;

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.tile.location(latitude, longitude) == Location::HasInterpolationNeighbors)
        {
            entry.last_use = stamp;
            return Ok(Rc::clone(&entry.tile));
        }

        let tile = self.load(latitude, longitude)?;
        let key = self.key_of(&tile);
        self.entries.push(Entry {
            key,
            tile: Rc::clone(&tile),
            last_use: stamp,
        });

        if self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_use)
                .map(|(idx, _)| idx)
                .ok_or(DemError::Internal("empty cache cannot overflow"))?;
            let evicted = self.entries.swap_remove(oldest);
            debug!("evicting tile {:?} from cache", evicted.key);
        }

        Ok(tile)
    }

    fn load(&mut self, latitude: C, longitude: C) -> Result<Rc<Tile>, DemError> {
        let mut tile = Tile::new();
        self.updater.update_tile(latitude, longitude, &mut tile)?;
        tile.seal()?;

        if self.loads == 0 {
            self.latitude_step = tile.latitude_step();
            self.longitude_step = tile.longitude_step();
            self.origin_latitude = tile.min_latitude();
            self.origin_longitude = tile.min_longitude();
            self.extent_latitude = (tile.latitude_rows() - 1) as C * tile.latitude_step();
            self.extent_longitude = (tile.longitude_columns() - 1) as C * tile.longitude_step();
        } else if !step_matches(tile.latitude_step(), self.latitude_step)
            || !step_matches(tile.longitude_step(), self.longitude_step)
        {
            return Err(DemError::HeterogeneousTiles {
                latitude_step: tile.latitude_step(),
                longitude_step: tile.longitude_step(),
                expected_latitude_step: self.latitude_step,
                expected_longitude_step: self.longitude_step,
            });
        }

        if tile.location(latitude, longitude) != Location::HasInterpolationNeighbors {
            return Err(DemError::Unavailable {
                latitude,
                longitude,
            });
        }

        self.loads += 1;
        debug!(
            "loaded tile ({:.6} rad, {:.6} rad), {} loads so far",
            tile.min_latitude(),
            tile.min_longitude(),
            self.loads
        );
        Ok(Rc::new(tile))
    }

    /// Grid coordinates of the tile's south-west corner.
    fn key_of(&self, tile: &Tile) -> (i64, i64) {
        let row = ((tile.min_latitude() - self.origin_latitude) / self.extent_latitude).round();
        let col = ((tile.min_longitude() - self.origin_longitude) / self.extent_longitude).round();
        (row as i64, col as i64)
    }
}

fn step_matches(step: C, expected: C) -> bool {
    (step - expected).abs() <= 1.0e-12 * expected.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Flat 1x1 (radian) tiles on a regular grid, counting loads.
    struct GridUpdater {
        loads: Cell<usize>,
        fail_everywhere: bool,
        rows: usize,
        cols: usize,
    }

    impl GridUpdater {
        fn new() -> Self {
            Self {
                loads: Cell::new(0),
                fail_everywhere: false,
                rows: 11,
                cols: 11,
            }
        }
    }

    impl TileUpdater for GridUpdater {
        fn update_tile(&self, latitude: C, longitude: C, tile: &mut Tile) -> Result<(), DemError> {
            if self.fail_everywhere {
                return Err(DemError::Unavailable {
                    latitude,
                    longitude,
                });
            }
            self.loads.set(self.loads.get() + 1);
            let lat0 = latitude.floor();
            let lon0 = longitude.floor();
            let step_lat = 1.0 / (self.rows - 1) as C;
            let step_lon = 1.0 / (self.cols - 1) as C;
            tile.set_geometry(lat0, lon0, step_lat, step_lon, self.rows, self.cols)?;
            for i in 0..self.rows {
                for j in 0..self.cols {
                    tile.set_elevation(i, j, 10.0 * lat0 + lon0)?;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn hit_does_not_reload() {
        let mut cache = TileCache::new(4, GridUpdater::new());
        let t1 = cache.get_tile(0.5, 0.5).unwrap();
        let t2 = cache.get_tile(0.6, 0.4).unwrap();
        assert!(Rc::ptr_eq(&t1, &t2));
        assert_eq!(cache.loads(), 1);
        assert_eq!(cache.accesses(), 2);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut cache = TileCache::new(2, GridUpdater::new());
        cache.get_tile(0.5, 0.5).unwrap(); // tile A
        cache.get_tile(1.5, 0.5).unwrap(); // tile B
        cache.get_tile(0.5, 0.5).unwrap(); // touch A
        cache.get_tile(2.5, 0.5).unwrap(); // tile C, evicts B
        assert_eq!(cache.loads(), 3);
        cache.get_tile(0.5, 0.5).unwrap(); // A still cached
        assert_eq!(cache.loads(), 3);
        cache.get_tile(1.5, 0.5).unwrap(); // B was evicted
        assert_eq!(cache.loads(), 4);
    }

    #[test]
    fn evicted_tile_survives_through_its_handle() {
        let mut cache = TileCache::new(1, GridUpdater::new());
        let first = cache.get_tile(0.5, 0.5).unwrap();
        cache.get_tile(1.5, 0.5).unwrap();
        // the cache dropped its reference, ours is still valid
        assert_eq!(first.interpolate(0.5, 0.5).unwrap(), 0.0);
    }

    #[test]
    fn updater_failure_propagates() {
        let mut updater = GridUpdater::new();
        updater.fail_everywhere = true;
        let mut cache = TileCache::new(2, updater);
        assert!(matches!(
            cache.get_tile(0.5, 0.5),
            Err(DemError::Unavailable { .. })
        ));
    }

    #[test]
    fn heterogeneous_steps_are_rejected() {
        struct Shrinking {
            loads: Cell<usize>,
        }
        impl TileUpdater for Shrinking {
            fn update_tile(&self, latitude: C, longitude: C, tile: &mut Tile) -> Result<(), DemError> {
                let n = self.loads.get();
                self.loads.set(n + 1);
                let rows = if n == 0 { 11 } else { 21 };
                let step = 1.0 / (rows - 1) as C;
                tile.set_geometry(latitude.floor(), longitude.floor(), step, step, rows, rows)?;
                for i in 0..rows {
                    for j in 0..rows {
                        tile.set_elevation(i, j, 0.0)?;
                    }
                }
                Ok(())
            }
        }
        let mut cache = TileCache::new(4, Shrinking { loads: Cell::new(0) });
        cache.get_tile(0.5, 0.5).unwrap();
        assert!(matches!(
            cache.get_tile(1.5, 0.5),
            Err(DemError::HeterogeneousTiles { .. })
        ));
    }

    #[test]
    fn capacity_twelve_region_replays_without_loads() {
        let mut cache = TileCache::new(12, GridUpdater::new());
        for lat in 0..4 {
            for lon in 0..3 {
                cache.get_tile(lat as C + 0.5, lon as C + 0.5).unwrap();
            }
        }
        assert_eq!(cache.loads(), 12);
        // pseudo-random replay inside the same region
        let mut x = 0x9e3779b97f4a7c15_u64;
        for _ in 0..200 {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let lat = (x >> 33) % 4;
            let lon = (x >> 11) % 3;
            cache
                .get_tile(lat as C + 0.5, lon as C + 0.5)
                .unwrap();
        }
        assert_eq!(cache.loads(), 12);
        // one access outside triggers exactly one more load
        cache.get_tile(5.5, 0.5).unwrap();
        assert_eq!(cache.loads(), 13);
    }
}

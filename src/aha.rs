//! AHA 16-segment zones synthesised from grid geometry.
//!
//! The depth axis is treated as the long axis (`z` in `[0, 1]`, base to apex) and
//! the in-plane angle around the grid centre picks the sector. Zones depend only
//! on the grid shape, never on mask contents, so they are cached per shape.

use ndarray::Array3;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::sync::{Arc, LazyLock, RwLock};

/// Number of AHA segments.
pub const ZONE_COUNT: u8 = 16;

/// Canonical AHA16 segment names, indexed by `zone id - 1`.
pub const ZONE_NAMES: [&str; 16] = [
    "Basal Anterior",
    "Basal Anteroseptal",
    "Basal Inferoseptal",
    "Basal Inferior",
    "Basal Inferolateral",
    "Basal Anterolateral",
    "Mid Anterior",
    "Mid Anteroseptal",
    "Mid Inferoseptal",
    "Mid Inferior",
    "Mid Inferolateral",
    "Mid Anterolateral",
    "Apical Anterior",
    "Apical Septal",
    "Apical Inferior",
    "Apical Lateral",
];

/// Half-open `[lo, hi)` long-axis rings and their sector counts.
///
/// The apical bound sits past 1.0 so the last slice (`z == 1`) is included.
const RINGS: [(f64, f64, usize); 3] = [
    (0.0, 1.0 / 3.0, 6),
    (1.0 / 3.0, 2.0 / 3.0, 6),
    (2.0 / 3.0, 1.01, 4),
];

/// Name of an AHA zone (1..=16).
pub fn zone_name(zone: u8) -> Option<&'static str> {
    (1..=ZONE_COUNT)
        .contains(&zone)
        .then(|| ZONE_NAMES[zone as usize - 1])
}

/// Zone id → canonical name for all 16 zones.
pub fn zone_names() -> BTreeMap<u8, &'static str> {
    (1..=ZONE_COUNT).zip(ZONE_NAMES).collect()
}

/// `n` evenly spaced samples over `[start, stop]`, endpoint included.
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| i as f64 * step + start).collect();
            out[n - 1] = stop;
            out
        }
    }
}

/// Per-voxel AHA zone assignment for one grid shape.
#[derive(Debug, Clone)]
pub struct AhaZones {
    /// Zone id per voxel; 0 where a voxel falls on an open sector bound.
    zone_ids: Array3<u8>,
}

impl AhaZones {
    /// Assign every voxel of a `(depth, height, width)` grid to its zone.
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        let z = linspace(0.0, 1.0, depth);
        let y = linspace(-1.0, 1.0, height);
        let x = linspace(-1.0, 1.0, width);

        let ring_sectors: Vec<Vec<f64>> = RINGS
            .iter()
            .map(|&(_, _, n)| linspace(0.0, 1.0, n + 1))
            .collect();

        let zone_ids = Array3::from_shape_fn((depth, height, width), |(i, j, k)| {
            let theta = (y[j].atan2(x[k]) + PI) / (2.0 * PI);
            let mut first_id = 1u8;
            for (ring, &(lo, hi, n)) in RINGS.iter().enumerate() {
                if z[i] >= lo && z[i] < hi {
                    let edges = &ring_sectors[ring];
                    return (0..n)
                        .find(|&s| theta >= edges[s] && theta < edges[s + 1])
                        .map_or(0, |s| first_id + s as u8);
                }
                first_id += n as u8;
            }
            0
        });

        Self { zone_ids }
    }

    /// Grid shape `(depth, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.zone_ids.dim()
    }

    /// Zone id per voxel (0 = unassigned).
    pub fn zone_ids(&self) -> &Array3<u8> {
        &self.zone_ids
    }

    /// Boolean mask of one zone.
    pub fn mask(&self, zone: u8) -> Array3<bool> {
        self.zone_ids.mapv(|z| z == zone && z != 0)
    }

    /// Masks for all 16 zones keyed by zone id.
    pub fn masks(&self) -> BTreeMap<u8, Array3<bool>> {
        (1..=ZONE_COUNT).map(|zone| (zone, self.mask(zone))).collect()
    }
}

/// Generate the 16 AHA zone masks for a grid shape.
pub fn generate_zones(depth: usize, height: usize, width: usize) -> BTreeMap<u8, Array3<bool>> {
    zones_for_shape(depth, height, width).masks()
}

// ============================================================================
// Shape-keyed cache
// ============================================================================

type Shape3 = (usize, usize, usize);

static ZONE_CACHE: LazyLock<RwLock<ZoneCache>> =
    LazyLock::new(|| RwLock::new(ZoneCache::new(DEFAULT_ZONE_CACHE_SIZE)));

/// Shapes kept in the zone cache unless reconfigured.
pub const DEFAULT_ZONE_CACHE_SIZE: usize = 8;

struct ZoneCache {
    entries: HashMap<Shape3, (Arc<AhaZones>, u64)>,
    max_entries: usize,
    access_counter: u64,
}

impl ZoneCache {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            access_counter: 0,
        }
    }

    fn get(&mut self, shape: Shape3) -> Option<Arc<AhaZones>> {
        self.access_counter += 1;
        let counter = self.access_counter;
        self.entries.get_mut(&shape).map(|(zones, last_access)| {
            *last_access = counter;
            zones.clone()
        })
    }

    fn insert(&mut self, shape: Shape3, zones: Arc<AhaZones>) {
        if self.max_entries == 0 {
            return;
        }
        while self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.access_counter += 1;
        self.entries.insert(shape, (zones, self.access_counter));
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, (_, last_access))| *last_access)
            .map(|(shape, _)| *shape)
        {
            self.entries.remove(&oldest);
        }
    }
}

/// Zones for a shape, built once and shared afterwards.
pub fn zones_for_shape(depth: usize, height: usize, width: usize) -> Arc<AhaZones> {
    let shape = (depth, height, width);
    if let Ok(mut cache) = ZONE_CACHE.write() {
        if let Some(zones) = cache.get(shape) {
            return zones;
        }
    }

    let zones = Arc::new(AhaZones::new(depth, height, width));
    if let Ok(mut cache) = ZONE_CACHE.write() {
        cache.insert(shape, zones.clone());
    }
    zones
}

/// Set the number of shapes kept in the zone cache; 0 disables caching.
pub fn set_zone_cache_size(max_entries: usize) {
    if let Ok(mut cache) = ZONE_CACHE.write() {
        cache.max_entries = max_entries;
        while cache.entries.len() > max_entries {
            cache.evict_oldest();
        }
    }
}

/// Drop all cached zone maps.
pub fn clear_zone_cache() {
    if let Ok(mut cache) = ZONE_CACHE.write() {
        cache.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_of(zone: u8) -> usize {
        match zone {
            1..=6 => 0,
            7..=12 => 1,
            _ => 2,
        }
    }

    #[test]
    fn test_zone_names() {
        assert_eq!(zone_name(1), Some("Basal Anterior"));
        assert_eq!(zone_name(16), Some("Apical Lateral"));
        assert_eq!(zone_name(0), None);
        assert_eq!(zone_name(17), None);
        assert_eq!(zone_names().len(), 16);
    }

    #[test]
    fn test_linspace_matches_endpoints() {
        assert_eq!(linspace(0.0, 1.0, 1), vec![0.0]);
        assert_eq!(linspace(-1.0, 1.0, 3), vec![-1.0, 0.0, 1.0]);
        let edges = linspace(0.0, 1.0, 7);
        assert_eq!(edges[0], 0.0);
        assert_eq!(edges[6], 1.0);
    }

    #[test]
    fn test_zones_partition_even_grid() {
        // Even in-plane extents keep every voxel off the theta == 1 seam.
        for &(d, h, w) in &[(1, 2, 2), (9, 8, 10), (12, 16, 16), (5, 4, 6)] {
            let masks = generate_zones(d, h, w);
            assert_eq!(masks.len(), 16);
            let mut cover = Array3::<u32>::zeros((d, h, w));
            for mask in masks.values() {
                assert_eq!(mask.dim(), (d, h, w));
                cover.zip_mut_with(mask, |c, &m| *c += u32::from(m));
            }
            assert!(cover.iter().all(|&c| c == 1), "shape {:?}", (d, h, w));
        }
    }

    #[test]
    fn test_zones_never_overlap_on_odd_grid() {
        let zones = AhaZones::new(7, 9, 9);
        let masks = zones.masks();
        let mut cover = Array3::<u32>::zeros((7, 9, 9));
        for mask in masks.values() {
            cover.zip_mut_with(mask, |c, &m| *c += u32::from(m));
        }
        assert!(cover.iter().all(|&c| c <= 1));
        // Only seam voxels (y == 0, x < 0) may be left unassigned.
        for ((i, j, k), &id) in zones.zone_ids().indexed_iter() {
            if id == 0 {
                assert_eq!(j, 4, "unassigned voxel off the seam at {:?}", (i, j, k));
                assert!(k < 4);
            }
        }
    }

    #[test]
    fn test_rings_follow_depth() {
        let zones = AhaZones::new(30, 8, 8);
        let ids = zones.zone_ids();
        assert_eq!(ring_of(ids[[0, 0, 0]]), 0);
        assert_eq!(ring_of(ids[[15, 0, 0]]), 1);
        assert_eq!(ring_of(ids[[29, 0, 0]]), 2);
        let masks = zones.masks();
        assert!(masks[&1].index_axis(ndarray::Axis(0), 0).iter().any(|&m| m));
        assert!(masks[&16].index_axis(ndarray::Axis(0), 29).iter().any(|&m| m));
    }

    #[test]
    fn test_last_slice_is_apical() {
        let zones = AhaZones::new(4, 2, 2);
        assert!(zones
            .zone_ids()
            .index_axis(ndarray::Axis(0), 3)
            .iter()
            .all(|&id| (13..=16).contains(&id)));
    }

    #[test]
    fn test_deterministic_and_cached() {
        let a = AhaZones::new(6, 10, 12);
        let b = AhaZones::new(6, 10, 12);
        assert_eq!(a.zone_ids(), b.zone_ids());

        let first = zones_for_shape(3, 5, 7);
        let second = zones_for_shape(3, 5, 7);
        assert_eq!(first.zone_ids(), second.zone_ids());
        assert_eq!(first.shape(), (3, 5, 7));
    }
}

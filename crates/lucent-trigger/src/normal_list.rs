//! Global per-normal distance index. One [`NormalList`] exists for every
//! distinct quantized normal direction with at least one registered chunk;
//! it answers "which chunks own a face plane whose distance falls inside
//! this interval" for the camera-movement projection queries.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use lucent_geom::{ChunkCoord, Dist, Vec3};
use lucent_sort::AccumulationGroup;

pub struct NormalList {
    normal: Vec3,
    /// distance -> chunks owning a face plane at that distance
    distances: BTreeMap<Dist, Vec<ChunkCoord>>,
    /// reverse index used for exact removal
    chunks: HashMap<ChunkCoord, Vec<Dist>>,
}

impl NormalList {
    pub fn new(normal: Vec3) -> Self {
        Self {
            normal,
            distances: BTreeMap::new(),
            chunks: HashMap::new(),
        }
    }

    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn has_chunk(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Registers a chunk's distances for this normal. A chunk must be
    /// removed before it can be re-added; double registration means the
    /// coordinator lost track of the index.
    pub fn add_chunk(&mut self, coord: ChunkCoord, group: &AccumulationGroup) {
        assert!(
            !self.chunks.contains_key(&coord),
            "chunk {coord:?} already registered on this normal"
        );
        let mut owned = Vec::with_capacity(group.distances.len());
        for &dist in &group.distances {
            self.distances.entry(dist).or_default().push(coord);
            owned.push(dist);
        }
        if !owned.is_empty() {
            self.chunks.insert(coord, owned);
        }
    }

    /// Removes exactly the entries the chunk contributed. Returns false if
    /// the chunk was not registered.
    pub fn remove_chunk(&mut self, coord: ChunkCoord) -> bool {
        let Some(owned) = self.chunks.remove(&coord) else {
            return false;
        };
        for dist in owned {
            if let Some(entries) = self.distances.get_mut(&dist) {
                entries.retain(|&c| c != coord);
                if entries.is_empty() {
                    self.distances.remove(&dist);
                }
            }
        }
        true
    }

    /// Calls `f` once per chunk owning any distance inside the closed
    /// interval `[start, end]`.
    pub fn query_range(&self, start: f32, end: f32, f: &mut dyn FnMut(ChunkCoord)) {
        debug_assert!(start <= end);
        let mut seen: HashSet<ChunkCoord> = HashSet::new();
        for (_, entries) in self.distances.range(Dist(start)..=Dist(end)) {
            for &coord in entries {
                if seen.insert(coord) {
                    f(coord);
                }
            }
        }
    }
}

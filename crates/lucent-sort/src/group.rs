use std::collections::BTreeSet;

use hashbrown::HashMap;
use lucent_geom::{ChunkCoord, Dist, Vec3};

use crate::quad::{DIRECTIONS, Facing, Quad, QuantizedNormal};

/// The set of unique face-plane distances one chunk contributes for a single
/// normal direction. Distances are kept sorted with duplicates merged.
#[derive(Clone, Debug)]
pub struct AccumulationGroup {
    pub coord: ChunkCoord,
    pub normal: Vec3,
    pub distances: BTreeSet<Dist>,
}

impl AccumulationGroup {
    pub fn new(coord: ChunkCoord, normal: Vec3) -> Self {
        Self {
            coord,
            normal,
            distances: BTreeSet::new(),
        }
    }

    /// Returns true if the distance was new for this normal.
    #[inline]
    pub fn add_distance(&mut self, distance: f32) -> bool {
        self.distances.insert(Dist(distance))
    }

    #[inline]
    pub fn plane_count(&self) -> usize {
        self.distances.len()
    }

    #[inline]
    pub fn min_distance(&self) -> Option<f32> {
        self.distances.first().map(|d| d.0)
    }

    #[inline]
    pub fn max_distance(&self) -> Option<f32> {
        self.distances.last().map(|d| d.0)
    }
}

/// All face planes of one chunk, split into the six aligned directions and a
/// map of quantized unaligned normals. This is what gets registered with the
/// trigger system for dynamically sorted chunks.
#[derive(Clone, Debug, Default)]
pub struct GeometryPlanes {
    aligned: [Option<AccumulationGroup>; DIRECTIONS],
    unaligned: HashMap<QuantizedNormal, AccumulationGroup>,
}

impl GeometryPlanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if called with the unaligned facing tag; that indicates the
    /// caller lost track of which path a quad took.
    pub fn add_aligned_plane(&mut self, coord: ChunkCoord, facing: Facing, distance: f32) {
        assert!(
            facing.is_aligned(),
            "cannot add an unaligned face as an aligned plane"
        );
        let group = self.aligned[facing.index()]
            .get_or_insert_with(|| AccumulationGroup::new(coord, facing.normal()));
        group.add_distance(distance);
    }

    pub fn add_unaligned_plane(&mut self, coord: ChunkCoord, normal: Vec3, distance: f32) {
        let quantized = QuantizedNormal::from_vec(normal);
        let group = self
            .unaligned
            .entry(quantized)
            .or_insert_with(|| AccumulationGroup::new(coord, normal.normalized()));
        group.add_distance(distance);
    }

    pub fn add_quad_plane(&mut self, coord: ChunkCoord, quad: &Quad) {
        if quad.facing.is_aligned() {
            self.add_aligned_plane(coord, quad.facing, quad.dot_product);
        } else {
            self.add_unaligned_plane(coord, quad.normal, quad.dot_product);
        }
    }

    pub fn from_quads(coord: ChunkCoord, quads: &[Quad]) -> Self {
        let mut planes = Self::new();
        for quad in quads {
            planes.add_quad_plane(coord, quad);
        }
        planes
    }

    pub fn plane_count(&self) -> usize {
        let aligned: usize = self
            .aligned
            .iter()
            .flatten()
            .map(AccumulationGroup::plane_count)
            .sum();
        let unaligned: usize = self
            .unaligned
            .values()
            .map(AccumulationGroup::plane_count)
            .sum();
        aligned + unaligned
    }

    pub fn is_empty(&self) -> bool {
        self.aligned.iter().all(Option::is_none) && self.unaligned.is_empty()
    }

    /// Drops the accumulated groups, keeping the allocation-free shell. Used
    /// when a chunk is never going to be trigger-registered.
    pub fn clear(&mut self) {
        self.aligned = Default::default();
        self.unaligned.clear();
    }

    pub fn iter_groups(&self) -> impl Iterator<Item = (QuantizedNormal, &AccumulationGroup)> {
        let aligned = self
            .aligned
            .iter()
            .enumerate()
            .filter_map(|(i, g)| {
                g.as_ref()
                    .map(|g| (QuantizedNormal::from_facing(Facing::from_index(i)), g))
            });
        let unaligned = self.unaligned.iter().map(|(q, g)| (*q, g));
        aligned.chain(unaligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_distances_merge() {
        let mut group = AccumulationGroup::new(ChunkCoord::new(0, 0, 0), Facing::PosY.normal());
        assert!(group.add_distance(4.0));
        assert!(!group.add_distance(4.0));
        assert!(group.add_distance(8.0));
        assert_eq!(group.plane_count(), 2);
        assert_eq!(group.min_distance(), Some(4.0));
        assert_eq!(group.max_distance(), Some(8.0));
    }

    #[test]
    #[should_panic(expected = "unaligned face")]
    fn aligned_plane_rejects_unaligned_tag() {
        let mut planes = GeometryPlanes::new();
        planes.add_aligned_plane(ChunkCoord::new(0, 0, 0), Facing::Unaligned, 1.0);
    }

    #[test]
    fn groups_split_by_quantized_normal() {
        let coord = ChunkCoord::new(1, 2, 3);
        let mut planes = GeometryPlanes::new();
        planes.add_aligned_plane(coord, Facing::PosX, 3.0);
        planes.add_aligned_plane(coord, Facing::PosX, 5.0);
        planes.add_unaligned_plane(coord, Vec3::new(0.6, 0.8, 0.0), 2.0);
        planes.add_unaligned_plane(coord, Vec3::new(0.6, 0.8, 0.0), 2.0);
        assert_eq!(planes.plane_count(), 3);
        assert_eq!(planes.iter_groups().count(), 2);
    }
}

//! Per-chunk geometry collection and sort-strategy selection.
//!
//! One collector instance exists per meshing task. Quads stream in during
//! meshing, `finish_rendering` freezes them and picks the cheapest strategy
//! that is still guaranteed correct, and `get_translucent_data` turns the
//! result into a [`TranslucentData`] value, reusing the previous build's data
//! when the geometry provably did not change.

use lucent_geom::{ChunkCoord, Vec3};

use crate::bsp::{self, NODE_REUSE_MIN_GENERATION};
use crate::data::{
    AnyOrderData, BspDynamicData, MeshRanges, SortType, StaticSortData, TopoDynamicData,
    TranslucentData, normal_relative_order,
};
use crate::group::GeometryPlanes;
use crate::quad::{
    DIRECTIONS, FACING_COUNT, Facing, OPPOSING_X, OPPOSING_Y, OPPOSING_Z, QUANTIZE_EPSILON, Quad,
    QuantizedNormal,
};
use crate::settings::{SortMode, SortSettings};
use crate::topo;

/// Quad-count limits for attempting a one-shot topological sort, indexed by
/// the number of distinct normals (clamped to 2..=5). More normals mean more
/// ordering constraints and a smaller worthwhile attempt.
const STATIC_TOPO_ATTEMPT_LIMITS: [i32; 6] = [-1, -1, 250, 100, 50, 30];

/// Stand-in plane count when some aligned facing has more than one plane;
/// only ever compared against the small special-case thresholds.
const MANY_PLANES: u32 = 100;

#[derive(Clone, Copy, Debug)]
struct TrackedNormal {
    normal: QuantizedNormal,
    distance2: Option<f32>,
}

/// The outcome of a data construction: either the caller's previous data is
/// still valid (skip index generation and re-upload), or a fresh value.
#[derive(Debug)]
pub enum DataOutcome {
    Reused,
    Built(TranslucentData),
}

pub struct GeometryCollector {
    coord: ChunkCoord,
    settings: SortSettings,
    quad_lists: [Vec<Quad>; FACING_COUNT],
    quads: Vec<Quad>,
    // bounding box of aligned geometry, valid only while no unaligned quad
    // has been seen
    extents: [f32; 6],
    // per-direction plane extreme: max for positive, min for negative facings
    aligned_extremes: [f32; 6],
    aligned_facing_bitmap: u32,
    aligned_extents_multiple: bool,
    has_unaligned: bool,
    unaligned_a: Option<TrackedNormal>,
    unaligned_b: Option<TrackedNormal>,
    sort_type: Option<SortType>,
    quad_hash: Option<u64>,
}

impl GeometryCollector {
    pub fn new(coord: ChunkCoord, settings: SortSettings) -> Self {
        Self {
            coord,
            settings,
            quad_lists: Default::default(),
            quads: Vec::new(),
            extents: [
                f32::NEG_INFINITY,
                f32::NEG_INFINITY,
                f32::NEG_INFINITY,
                f32::INFINITY,
                f32::INFINITY,
                f32::INFINITY,
            ],
            aligned_extremes: [
                f32::NEG_INFINITY,
                f32::NEG_INFINITY,
                f32::NEG_INFINITY,
                f32::INFINITY,
                f32::INFINITY,
                f32::INFINITY,
            ],
            aligned_facing_bitmap: 0,
            aligned_extents_multiple: false,
            has_unaligned: false,
            unaligned_a: None,
            unaligned_b: None,
            sort_type: None,
            quad_hash: None,
        }
    }

    #[inline]
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn quad_count(&self) -> usize {
        self.quad_lists.iter().map(Vec::len).sum::<usize>() + self.quads.len()
    }

    /// Accumulates one translucent quad. `vertices` must describe a planar
    /// convex polygon; `normal` is only consulted for unaligned facings.
    pub fn add_quad(&mut self, facing: Facing, vertices: &[Vec3; 4], normal: Vec3) {
        debug_assert!(self.sort_type.is_none(), "collector already finished");

        let mut sum = Vec3::ZERO;
        let mut distinct = 0u32;
        let mut last = vertices[3];
        let mut min = vertices[0];
        let mut max = vertices[0];
        for (i, &v) in vertices.iter().enumerate() {
            min = min.min(v);
            max = max.max(v);
            // duplicate vertices of degenerate quads contribute nothing to
            // the centroid
            if v != last {
                sum += v;
                distinct += 1;
            }
            if i != 3 {
                last = v;
            }
        }

        let mut extents = [max.x, max.y, max.z, min.x, min.y, min.z];
        // shrink in the non-normal directions so epsilon offsets applied by
        // fluid meshing cannot create false plane intersections
        for axis in 0..3 {
            if facing.is_aligned() && facing.axis() == axis {
                continue;
            }
            extents[axis] -= QUANTIZE_EPSILON;
            extents[axis + 3] += QUANTIZE_EPSILON;
            if extents[axis + 3] > extents[axis] {
                extents[axis + 3] = extents[axis];
            }
        }

        if facing.is_aligned() {
            // the bounding box only feeds the convex-box test, which is
            // meaningless once unaligned quads are present
            if !self.has_unaligned {
                for i in 0..3 {
                    self.extents[i] = self.extents[i].max(extents[i]);
                    self.extents[i + 3] = self.extents[i + 3].min(extents[i + 3]);
                }
            }

            if !self.quad_lists[facing.index()].is_empty() {
                self.aligned_extents_multiple = true;
            }
            let quad = Quad::from_aligned(facing, extents);
            let direction = facing.index();
            let distance = quad.dot_product;
            if facing.sign() > 0 {
                self.aligned_extremes[direction] = self.aligned_extremes[direction].max(distance);
            } else {
                self.aligned_extremes[direction] = self.aligned_extremes[direction].min(distance);
            }
            self.quad_lists[direction].push(quad);
        } else {
            self.has_unaligned = true;
            let center = if distinct > 0 {
                sum / distinct as f32
            } else {
                vertices[0]
            };
            let quad = Quad::from_unaligned(extents, center, normal);
            let distance = quad.dot_product;
            let key = quad.quantized;
            // track up to two unaligned normals with up to two distances
            // each; that is all the special-case heuristics can distinguish
            if let Some(a) = &mut self.unaligned_a {
                if a.normal == key {
                    a.distance2 = Some(distance);
                } else if let Some(b) = &mut self.unaligned_b {
                    if b.normal == key {
                        b.distance2 = Some(distance);
                    }
                } else {
                    self.unaligned_b = Some(TrackedNormal {
                        normal: key,
                        distance2: None,
                    });
                }
            } else {
                self.unaligned_a = Some(TrackedNormal {
                    normal: key,
                    distance2: None,
                });
            }
            self.quad_lists[Facing::Unaligned.index()].push(quad);
        }
    }

    /// Freezes the collected geometry and determines the sort type. Must be
    /// called exactly once per build.
    pub fn finish_rendering(&mut self) -> SortType {
        assert!(
            self.sort_type.is_none(),
            "finish_rendering called twice on one collector"
        );

        let total: usize = self.quad_lists.iter().map(Vec::len).sum();
        let mut quads = Vec::with_capacity(total);
        for direction in 0..FACING_COUNT {
            let list = &mut self.quad_lists[direction];
            if list.is_empty() {
                continue;
            }
            if direction < DIRECTIONS {
                self.aligned_facing_bitmap |= 1 << direction;
            }
            quads.append(list);
        }
        self.quads = quads;

        let sort_type = filter_sort_type(self.settings.mode, self.sort_type_heuristic());
        self.sort_type = Some(sort_type);
        sort_type
    }

    /// Special cases, checked in order:
    /// A. one face plane or sorting disabled: nothing can overlap.
    /// B. exactly two opposing aligned normals with one plane each: the faces
    ///    cannot be seen through each other.
    /// C. aligned-only geometry forming the outward faces of one convex box.
    /// D. one normal, or exactly two exact opposites: a fixed per-normal
    ///    distance order is always correct.
    /// Then a bounded attempt at a one-shot topological sort, else dynamic.
    fn sort_type_heuristic(&self) -> SortType {
        let aligned_normal_count = self.aligned_facing_bitmap.count_ones();
        let aligned_plane_count = if self.aligned_extents_multiple {
            MANY_PLANES
        } else {
            aligned_normal_count
        };

        let mut unaligned_plane_count = 0u32;
        let mut unaligned_normal_count = 0u32;
        for tracked in [&self.unaligned_a, &self.unaligned_b].into_iter().flatten() {
            unaligned_normal_count += 1;
            unaligned_plane_count += 1 + u32::from(tracked.distance2.is_some());
        }

        let plane_count = aligned_plane_count + unaligned_plane_count;
        let normal_count = aligned_normal_count + unaligned_normal_count;

        // case A
        if self.settings.mode == SortMode::Off || plane_count <= 1 {
            return SortType::None;
        }

        if !self.has_unaligned {
            let two_opposing = self.aligned_facing_bitmap == OPPOSING_X
                || self.aligned_facing_bitmap == OPPOSING_Y
                || self.aligned_facing_bitmap == OPPOSING_Z;

            // case B
            if plane_count == 2 && two_opposing {
                return SortType::None;
            }

            // case C: every facing has one plane and each lines up with the
            // geometry bounding box
            if !self.aligned_extents_multiple {
                let mut passes = true;
                for direction in 0..DIRECTIONS {
                    let extreme = self.aligned_extremes[direction];
                    if extreme.is_infinite() {
                        continue;
                    }
                    let sign = if direction < 3 { 1.0 } else { -1.0 };
                    if sign * extreme != self.extents[direction] {
                        passes = false;
                        break;
                    }
                }
                if passes {
                    return SortType::None;
                }
            }

            // case D
            if two_opposing || aligned_normal_count == 1 {
                return SortType::StaticNormalRelative;
            }
        } else if aligned_normal_count == 0 {
            // case D for one or two opposing unaligned normals
            let opposing_unaligned = match (&self.unaligned_a, &self.unaligned_b) {
                (Some(_), None) => true,
                (Some(a), Some(b)) => a.normal.is_opposite(b.normal),
                _ => false,
            };
            if opposing_unaligned {
                return SortType::StaticNormalRelative;
            }
        } else if plane_count == 2 {
            // case D with one aligned and one unaligned normal
            let direction = self.aligned_facing_bitmap.trailing_zeros() as usize;
            let aligned = QuantizedNormal::from_facing(Facing::from_index(direction));
            if let Some(a) = &self.unaligned_a {
                if a.normal.is_opposite(aligned) {
                    return SortType::StaticNormalRelative;
                }
            }
        }

        let limit_index = (normal_count as usize).clamp(2, STATIC_TOPO_ATTEMPT_LIMITS.len() - 1);
        if self.quads.len() as i32 <= STATIC_TOPO_ATTEMPT_LIMITS[limit_index] {
            return SortType::StaticTopo;
        }

        SortType::Dynamic
    }

    fn quad_hash(&mut self) -> u64 {
        if let Some(hash) = self.quad_hash {
            return hash;
        }
        let mut hash = 0u64;
        for (i, quad) in self.quads.iter().enumerate() {
            hash = hash
                .wrapping_mul(31)
                .wrapping_add(quad.content_hash())
                .wrapping_add(i as u64 * 3);
        }
        self.quad_hash = Some(hash);
        hash
    }

    /// Builds the chunk's [`TranslucentData`], or reports that `old_data` can
    /// be kept as-is because the geometry is provably identical (same vertex
    /// ranges for orderless chunks, same quad count and content hash
    /// otherwise).
    pub fn get_translucent_data(
        &mut self,
        old_data: Option<&TranslucentData>,
        ranges: &MeshRanges,
        camera: Vec3,
    ) -> DataOutcome {
        let mut sort_type = self
            .sort_type
            .expect("finish_rendering must be called before get_translucent_data");

        if self.quads.is_empty() {
            return DataOutcome::Built(TranslucentData::NoData { coord: self.coord });
        }

        if let Some(old) = old_data {
            if sort_type == SortType::None {
                if let TranslucentData::AnyOrder(old_any) = old {
                    if old_any.quad_count == self.quads.len() && old_any.ranges == *ranges {
                        return DataOutcome::Reused;
                    }
                }
            }
            if old.quad_count() == self.quads.len()
                && old.quad_hash() == Some(self.quad_hash())
            {
                return DataOutcome::Reused;
            }
        }

        if sort_type == SortType::StaticTopo {
            match topo::topo_sort(&self.quads) {
                Some(order) => {
                    return DataOutcome::Built(TranslucentData::StaticTopoAcyclic(StaticSortData {
                        coord: self.coord,
                        quad_count: self.quads.len(),
                        quad_hash: self.quad_hash(),
                        range: ranges.unassigned(),
                        indexes: order,
                    }));
                }
                None => {
                    // a cycle was found; re-apply the mode filter since the
                    // user may have forbidden dynamic sorting
                    sort_type = filter_sort_type(self.settings.mode, SortType::Dynamic);
                }
            }
        }

        match sort_type {
            SortType::None => DataOutcome::Built(TranslucentData::AnyOrder(AnyOrderData {
                coord: self.coord,
                quad_count: self.quads.len(),
                quad_hash: self.quad_hash(),
                ranges: ranges.clone(),
            })),
            SortType::StaticNormalRelative => {
                DataOutcome::Built(TranslucentData::StaticNormalRelative(StaticSortData {
                    coord: self.coord,
                    quad_count: self.quads.len(),
                    quad_hash: self.quad_hash(),
                    range: ranges.unassigned(),
                    indexes: normal_relative_order(&self.quads),
                }))
            }
            SortType::Dynamic => DataOutcome::Built(self.make_dynamic_data(old_data, ranges, camera)),
            SortType::StaticTopo => unreachable!("static topo handled above"),
        }
    }

    fn make_dynamic_data(
        &mut self,
        old_data: Option<&TranslucentData>,
        ranges: &MeshRanges,
        camera: Vec3,
    ) -> TranslucentData {
        let quad_hash = self.quad_hash();
        let range = ranges.unassigned();

        if !self.settings.only_topo_sort {
            let (old_tree, generation) = match old_data {
                Some(TranslucentData::BspDynamic(old)) => (Some(old.tree()), old.generation + 1),
                _ => (None, 0),
            };
            let prepare_reuse = generation >= NODE_REUSE_MIN_GENERATION;
            match bsp::build_bsp(self.coord, &self.quads, old_tree, prepare_reuse) {
                Ok(result) => {
                    return TranslucentData::BspDynamic(BspDynamicData::new(
                        self.coord,
                        self.quads.len(),
                        quad_hash,
                        range,
                        result.tree,
                        result.planes,
                        generation,
                        camera,
                    ));
                }
                Err(err) => {
                    log::warn!("{err}; falling back to topological sorting");
                }
            }
        }

        let planes = GeometryPlanes::from_quads(self.coord, &self.quads);
        TranslucentData::TopoDynamic(TopoDynamicData::from_quads(
            self.coord,
            std::mem::take(&mut self.quads),
            quad_hash,
            range,
            planes,
            camera,
        ))
    }
}

/// Clamps a heuristic result to the user-configured sort mode.
fn filter_sort_type(mode: SortMode, sort_type: SortType) -> SortType {
    match mode {
        SortMode::Off => SortType::None,
        SortMode::Static => match sort_type {
            SortType::StaticNormalRelative | SortType::StaticTopo => sort_type,
            _ => SortType::None,
        },
        SortMode::Dynamic => sort_type,
    }
}

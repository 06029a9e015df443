//! Per-chunk sort results. One value of [`TranslucentData`] describes how a
//! chunk's translucent quads are ordered and what the trigger system needs to
//! know about it. Values are built off-thread, published to the renderer, and
//! superseded wholesale on rebuild.

use lucent_geom::{ChunkCoord, Vec3};

use crate::bsp::BspTree;
use crate::group::GeometryPlanes;
use crate::quad::{FACING_COUNT, Quad};
use crate::topo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortType {
    None,
    StaticNormalRelative,
    StaticTopo,
    Dynamic,
}

impl SortType {
    pub const COUNT: usize = 4;

    #[inline]
    pub fn index(self) -> usize {
        match self {
            SortType::None => 0,
            SortType::StaticNormalRelative => 1,
            SortType::StaticTopo => 2,
            SortType::Dynamic => 3,
        }
    }
}

/// A contiguous span of vertices in the caller's built mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexRange {
    pub offset: u32,
    pub vertex_count: u32,
}

/// The vertex-range partition of a built translucent mesh, one slot per
/// facing plus the unassigned bucket used by direction-mixing strategies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshRanges {
    pub per_facing: [Option<VertexRange>; FACING_COUNT],
}

impl MeshRanges {
    #[inline]
    pub fn unassigned(&self) -> Option<VertexRange> {
        self.per_facing[FACING_COUNT - 1]
    }

    pub fn is_empty(&self) -> bool {
        self.per_facing.iter().all(Option::is_none)
    }
}

/// Dynamic-topo chunks with at most this many quads register with the direct
/// octree index instead of the per-plane interval index; re-sorting them is
/// cheap enough that the coarser trigger wins.
pub const DIRECT_TRIGGER_MAX_QUADS: usize = 100;

/// After this many consecutive topo-sort failures a chunk stops attempting
/// topo sorts, keeps the distance order, and escalates to direct triggering.
pub const MAX_TOPO_SORT_FAILURES: u32 = 2;

/// One-shot trigger registration changes requested by a dynamic-topo chunk,
/// applied and cleared by the trigger coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerChanges {
    pub turn_gfni_off: bool,
    pub turn_direct_on: bool,
    pub turn_direct_off: bool,
}

impl TriggerChanges {
    #[inline]
    pub fn any(&self) -> bool {
        self.turn_gfni_off || self.turn_direct_on || self.turn_direct_off
    }
}

#[derive(Clone, Debug)]
pub struct AnyOrderData {
    pub coord: ChunkCoord,
    pub quad_count: usize,
    pub quad_hash: u64,
    pub ranges: MeshRanges,
}

#[derive(Clone, Debug)]
pub struct StaticSortData {
    pub coord: ChunkCoord,
    pub quad_count: usize,
    pub quad_hash: u64,
    pub range: Option<VertexRange>,
    pub indexes: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct TopoDynamicData {
    pub coord: ChunkCoord,
    pub quad_count: usize,
    pub quad_hash: u64,
    pub range: Option<VertexRange>,
    pub indexes: Vec<u32>,
    pub planes: GeometryPlanes,
    quads: Vec<Quad>,
    gfni_enabled: bool,
    direct_enabled: bool,
    consecutive_failures: u32,
    pending: TriggerChanges,
}

impl TopoDynamicData {
    pub fn from_quads(
        coord: ChunkCoord,
        quads: Vec<Quad>,
        quad_hash: u64,
        range: Option<VertexRange>,
        planes: GeometryPlanes,
        camera: Vec3,
    ) -> Self {
        let direct = quads.len() <= DIRECT_TRIGGER_MAX_QUADS;
        let mut data = Self {
            coord,
            quad_count: quads.len(),
            quad_hash,
            range,
            indexes: Vec::with_capacity(quads.len()),
            planes,
            quads,
            gfni_enabled: !direct,
            direct_enabled: direct,
            consecutive_failures: 0,
            pending: TriggerChanges::default(),
        };
        data.sort(camera);
        data
    }

    #[inline]
    pub fn gfni_enabled(&self) -> bool {
        self.gfni_enabled
    }

    #[inline]
    pub fn direct_enabled(&self) -> bool {
        self.direct_enabled
    }

    /// Returns and clears the pending registration changes.
    pub fn take_trigger_changes(&mut self) -> TriggerChanges {
        std::mem::take(&mut self.pending)
    }

    pub fn clear_trigger_changes(&mut self) {
        self.pending = TriggerChanges::default();
    }

    /// Drops the accumulated plane data for chunks that will never be
    /// GFNI-registered, freeing the per-normal distance sets.
    pub fn clear_plane_data(&mut self) {
        self.planes.clear();
    }

    fn sort(&mut self, camera: Vec3) {
        if self.consecutive_failures < MAX_TOPO_SORT_FAILURES {
            if let Some(order) = topo::topo_sort(&self.quads) {
                self.indexes = order;
                self.consecutive_failures = 0;
                return;
            }
            self.consecutive_failures += 1;
            if self.consecutive_failures >= MAX_TOPO_SORT_FAILURES {
                // topo keeps failing: keep distance orders from now on, which
                // need re-sorting on any nearby movement, not just on plane
                // crossings
                if self.gfni_enabled {
                    self.gfni_enabled = false;
                    self.pending.turn_gfni_off = true;
                }
                if !self.direct_enabled {
                    self.direct_enabled = true;
                    self.pending.turn_direct_on = true;
                }
            }
        }
        self.indexes = topo::distance_sort(&self.quads, camera);
    }
}

#[derive(Clone, Debug)]
pub struct BspDynamicData {
    pub coord: ChunkCoord,
    pub quad_count: usize,
    pub quad_hash: u64,
    pub range: Option<VertexRange>,
    pub indexes: Vec<u32>,
    pub planes: GeometryPlanes,
    pub generation: u32,
    tree: BspTree,
}

impl BspDynamicData {
    pub fn new(
        coord: ChunkCoord,
        quad_count: usize,
        quad_hash: u64,
        range: Option<VertexRange>,
        tree: BspTree,
        planes: GeometryPlanes,
        generation: u32,
        camera: Vec3,
    ) -> Self {
        let mut data = Self {
            coord,
            quad_count,
            quad_hash,
            range,
            indexes: Vec::with_capacity(quad_count),
            planes,
            generation,
            tree,
        };
        data.tree.collect_sorted_quads(camera, &mut data.indexes);
        data
    }

    #[inline]
    pub fn tree(&self) -> &BspTree {
        &self.tree
    }
}

#[derive(Clone, Debug)]
pub enum TranslucentData {
    /// The chunk has no translucent geometry at all.
    NoData { coord: ChunkCoord },
    /// Strategy NONE: any order is correct, nothing to maintain.
    AnyOrder(AnyOrderData),
    /// Fixed order, ascending by distance within each normal.
    StaticNormalRelative(StaticSortData),
    /// One-shot topological order, valid from every viewpoint.
    StaticTopoAcyclic(StaticSortData),
    /// Re-sorted topologically (or by distance) on trigger.
    TopoDynamic(TopoDynamicData),
    /// Re-sorted by BSP traversal on trigger.
    BspDynamic(BspDynamicData),
}

impl TranslucentData {
    pub fn coord(&self) -> ChunkCoord {
        match self {
            TranslucentData::NoData { coord } => *coord,
            TranslucentData::AnyOrder(d) => d.coord,
            TranslucentData::StaticNormalRelative(d) | TranslucentData::StaticTopoAcyclic(d) => {
                d.coord
            }
            TranslucentData::TopoDynamic(d) => d.coord,
            TranslucentData::BspDynamic(d) => d.coord,
        }
    }

    pub fn sort_type(&self) -> SortType {
        match self {
            TranslucentData::NoData { .. } | TranslucentData::AnyOrder(_) => SortType::None,
            TranslucentData::StaticNormalRelative(_) => SortType::StaticNormalRelative,
            TranslucentData::StaticTopoAcyclic(_) => SortType::StaticTopo,
            TranslucentData::TopoDynamic(_) | TranslucentData::BspDynamic(_) => SortType::Dynamic,
        }
    }

    pub fn quad_count(&self) -> usize {
        match self {
            TranslucentData::NoData { .. } => 0,
            TranslucentData::AnyOrder(d) => d.quad_count,
            TranslucentData::StaticNormalRelative(d) | TranslucentData::StaticTopoAcyclic(d) => {
                d.quad_count
            }
            TranslucentData::TopoDynamic(d) => d.quad_count,
            TranslucentData::BspDynamic(d) => d.quad_count,
        }
    }

    pub fn quad_hash(&self) -> Option<u64> {
        match self {
            TranslucentData::NoData { .. } => None,
            TranslucentData::AnyOrder(d) => Some(d.quad_hash),
            TranslucentData::StaticNormalRelative(d) | TranslucentData::StaticTopoAcyclic(d) => {
                Some(d.quad_hash)
            }
            TranslucentData::TopoDynamic(d) => Some(d.quad_hash),
            TranslucentData::BspDynamic(d) => Some(d.quad_hash),
        }
    }

    /// Draw order as indices into the chunk's translucent quad list, in the
    /// order the quads were collected. `None` for orderless strategies.
    pub fn indexes(&self) -> Option<&[u32]> {
        match self {
            TranslucentData::NoData { .. } | TranslucentData::AnyOrder(_) => None,
            TranslucentData::StaticNormalRelative(d) | TranslucentData::StaticTopoAcyclic(d) => {
                Some(&d.indexes)
            }
            TranslucentData::TopoDynamic(d) => Some(&d.indexes),
            TranslucentData::BspDynamic(d) => Some(&d.indexes),
        }
    }

    /// The face planes this chunk registers with the trigger system; `None`
    /// for strategies that never trigger.
    pub fn planes(&self) -> Option<&GeometryPlanes> {
        match self {
            TranslucentData::TopoDynamic(d) => Some(&d.planes),
            TranslucentData::BspDynamic(d) => Some(&d.planes),
            _ => None,
        }
    }

    /// Re-sorts a dynamic chunk for the given camera position. Returns false
    /// for strategies whose order never changes.
    pub fn sort_on_trigger(&mut self, camera: Vec3) -> bool {
        match self {
            TranslucentData::TopoDynamic(d) => {
                d.sort(camera);
                true
            }
            TranslucentData::BspDynamic(d) => {
                let mut indexes = std::mem::take(&mut d.indexes);
                d.tree.collect_sorted_quads(camera, &mut indexes);
                d.indexes = indexes;
                true
            }
            _ => false,
        }
    }
}

/// Fixed order for chunks whose normals cannot see each other: group quads by
/// quantized normal and emit each group in ascending plane distance.
pub fn normal_relative_order(quads: &[Quad]) -> Vec<u32> {
    let mut order: Vec<u32> = (0..quads.len() as u32).collect();
    order.sort_by(|&a, &b| {
        let qa = &quads[a as usize];
        let qb = &quads[b as usize];
        let ka = (qa.quantized.x, qa.quantized.y, qa.quantized.z);
        let kb = (qb.quantized.x, qb.quantized.y, qb.quantized.z);
        ka.cmp(&kb)
            .then_with(|| qa.dot_product.total_cmp(&qb.dot_product))
            .then_with(|| a.cmp(&b))
    });
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quad::Facing;

    fn pane(facing: Facing, plane: f32) -> Quad {
        let mut extents = [16.0, 16.0, 16.0, 0.0, 0.0, 0.0];
        let axis = facing.axis();
        extents[axis] = plane;
        extents[axis + 3] = plane;
        Quad::from_aligned(facing, extents)
    }

    #[test]
    fn normal_relative_order_ascends_within_each_normal() {
        let quads = vec![
            pane(Facing::PosY, 9.0),
            pane(Facing::NegY, 3.0),
            pane(Facing::PosY, 1.0),
            pane(Facing::NegY, 12.0),
        ];
        let order = normal_relative_order(&quads);
        let positions: Vec<usize> = (0..quads.len())
            .map(|i| order.iter().position(|&o| o == i as u32).unwrap())
            .collect();
        // within +Y: 1.0 before 9.0; within -Y: dot -3.0 before... -12.0 < -3.0
        assert!(positions[2] < positions[0]);
        assert!(positions[3] < positions[1]);
    }

    #[test]
    fn small_topo_chunks_prefer_direct_triggering() {
        let quads = vec![pane(Facing::PosY, 2.0), pane(Facing::PosY, 6.0)];
        let planes = GeometryPlanes::from_quads(ChunkCoord::new(0, 0, 0), &quads);
        let data = TopoDynamicData::from_quads(
            ChunkCoord::new(0, 0, 0),
            quads,
            7,
            None,
            planes,
            Vec3::ZERO,
        );
        assert!(data.direct_enabled());
        assert!(!data.gfni_enabled());
    }

    #[test]
    fn repeated_topo_failure_escalates_to_direct() {
        // crossing panes cannot be topo sorted
        let a = Quad::from_aligned(Facing::PosX, [8.0, 16.0, 16.0, 8.0, 0.0, 0.0]);
        let b = Quad::from_aligned(Facing::PosZ, [16.0, 16.0, 8.0, 0.0, 0.0, 8.0]);
        let quads: Vec<Quad> = (0..101)
            .map(|i| if i % 2 == 0 { a.clone() } else { b.clone() })
            .collect();
        let planes = GeometryPlanes::from_quads(ChunkCoord::new(0, 0, 0), &quads);
        let mut data = TopoDynamicData::from_quads(
            ChunkCoord::new(0, 0, 0),
            quads,
            1,
            None,
            planes,
            Vec3::ZERO,
        );
        assert!(data.gfni_enabled());
        data.sort(Vec3::new(1.0, 0.0, 0.0));
        assert!(!data.gfni_enabled());
        assert!(data.direct_enabled());
        let changes = data.take_trigger_changes();
        assert!(changes.turn_gfni_off);
        assert!(changes.turn_direct_on);
        assert!(!data.take_trigger_changes().any());
    }
}

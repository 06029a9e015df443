//! Camera-movement triggering for translucency sorting.
//!
//! [`SortTriggering`] is the single coordination point: it counts the data
//! objects per sort type and owns the two trigger indices. The global index
//! (GFNI) keeps one [`NormalList`] per quantized normal direction and fires
//! when the camera's movement projected onto that normal sweeps over a
//! registered face-plane distance. The direct index keeps small
//! dynamically-sorted chunks in an octree and fires when the movement
//! segment touches a chunk's cube. Both may over-trigger; neither may miss
//! a real crossing. All methods here run on the frame-owning thread.
#![forbid(unsafe_code)]

mod normal_list;
mod octree;

use hashbrown::{HashMap, HashSet};
use lucent_geom::{ChunkCoord, Vec3};
use lucent_sort::{GeometryPlanes, QuantizedNormal, SortType, TranslucentData};

pub use normal_list::NormalList;
pub use octree::{ChunkOctree, OctreeNodeId};

/// One camera movement event: the position before and after.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraMovement {
    pub last: Vec3,
    pub current: Vec3,
}

impl CameraMovement {
    #[inline]
    pub const fn new(last: Vec3, current: Vec3) -> Self {
        Self { last, current }
    }
}

#[derive(Default)]
struct GfniTriggers {
    lists: HashMap<QuantizedNormal, NormalList>,
}

impl GfniTriggers {
    fn unique_normal_count(&self) -> usize {
        self.lists.len()
    }

    fn remove_chunk(&mut self, coord: ChunkCoord) {
        self.lists.retain(|_, list| {
            list.remove_chunk(coord);
            !list.is_empty()
        });
    }

    fn add_planes(&mut self, coord: ChunkCoord, planes: &GeometryPlanes) {
        for (quantized, group) in planes.iter_groups() {
            self.lists
                .entry(quantized)
                .or_insert_with(|| NormalList::new(group.normal))
                .add_chunk(coord, group);
        }
    }

    fn process(
        &self,
        movement: &CameraMovement,
        on_trigger: &mut dyn FnMut(QuantizedNormal, ChunkCoord),
    ) {
        for (&quantized, list) in &self.lists {
            let a = list.normal().dot(movement.last);
            let b = list.normal().dot(movement.current);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            list.query_range(start, end, &mut |coord| on_trigger(quantized, coord));
        }
    }
}

#[derive(Default)]
struct DirectTriggers {
    octree: ChunkOctree,
}

impl DirectTriggers {
    fn add(&mut self, coord: ChunkCoord) {
        if !self.octree.contains(coord) {
            self.octree.insert(coord);
        }
    }

    fn remove(&mut self, coord: ChunkCoord) {
        if self.octree.contains(coord) {
            self.octree.remove(coord);
        }
    }

    fn chunk_count(&self) -> usize {
        self.octree.len()
    }

    fn process(&self, movement: &CameraMovement, on_trigger: &mut dyn FnMut(ChunkCoord)) {
        if self.octree.is_empty() {
            return;
        }
        let lo = movement.last.min(movement.current);
        let hi = movement.last.max(movement.current);
        // padded by one cell so cubes merely grazed at a shared boundary are
        // still candidates; the segment test settles the rest
        let min = ChunkCoord::containing(lo).offset(-1, -1, -1);
        let max = ChunkCoord::containing(hi).offset(1, 1, 1);
        self.octree.visit_intersecting(min, max, &mut |coord| {
            if coord.aabb().intersects_segment(movement.last, movement.current) {
                on_trigger(coord);
            }
        });
    }
}

/// Central coordination point for translucency-sort triggering.
pub struct SortTriggering {
    gfni: GfniTriggers,
    direct: DirectTriggers,
    sort_type_counters: [usize; SortType::COUNT],
    gfni_trigger_count: usize,
    direct_trigger_count: usize,
    triggered_normals: HashSet<QuantizedNormal>,
    triggered_normal_count: usize,
}

impl Default for SortTriggering {
    fn default() -> Self {
        Self::new()
    }
}

impl SortTriggering {
    pub fn new() -> Self {
        Self {
            gfni: GfniTriggers::default(),
            direct: DirectTriggers::default(),
            sort_type_counters: [0; SortType::COUNT],
            gfni_trigger_count: 0,
            direct_trigger_count: 0,
            triggered_normals: HashSet::new(),
            triggered_normal_count: 0,
        }
    }

    /// Invokes `callback(coord, is_direct)` for every chunk whose ordering
    /// may have gone stale over the given movement. A chunk can be signaled
    /// more than once; the callback means "reconsider this chunk", not
    /// "unique chunk".
    pub fn trigger_sections(
        &mut self,
        callback: &mut dyn FnMut(ChunkCoord, bool),
        movement: CameraMovement,
    ) {
        let mut triggered_normals = std::mem::take(&mut self.triggered_normals);
        triggered_normals.clear();
        let mut gfni_count = 0usize;
        let mut direct_count = 0usize;

        self.gfni.process(&movement, &mut |normal, coord| {
            triggered_normals.insert(normal);
            callback(coord, false);
            gfni_count += 1;
        });
        self.direct.process(&movement, &mut |coord| {
            callback(coord, true);
            direct_count += 1;
        });

        // quiet events keep the previous statistics so the debug overlay
        // shows the last interesting frame
        if gfni_count > 0 || direct_count > 0 {
            self.gfni_trigger_count = gfni_count;
            self.direct_trigger_count = direct_count;
            self.triggered_normal_count = triggered_normals.len();
        }
        self.triggered_normals = triggered_normals;
    }

    /// Swaps a chunk's registrations from its previous data to its freshly
    /// built data: strategy counters, interval-index planes, and direct
    /// octree membership, clearing any pending one-shot trigger flags.
    pub fn integrate_translucent_data(
        &mut self,
        old_data: Option<&TranslucentData>,
        new_data: &mut TranslucentData,
        _camera: Vec3,
    ) {
        let coord = new_data.coord();
        if let Some(old) = old_data {
            debug_assert_eq!(old.coord(), coord, "integrating data across chunks");
        }
        self.sort_type_counters[new_data.sort_type().index()] += 1;

        match new_data {
            TranslucentData::BspDynamic(data) => {
                self.replace_dynamic(old_data, coord);
                self.gfni.add_planes(coord, &data.planes);
            }
            TranslucentData::TopoDynamic(data) => {
                self.replace_dynamic(old_data, coord);
                if data.gfni_enabled() {
                    self.gfni.add_planes(coord, &data.planes);
                } else {
                    // this chunk will never be interval-triggered; the
                    // distance sets are dead weight
                    data.clear_plane_data();
                }
                if data.direct_enabled() {
                    self.direct.add(coord);
                }
                data.clear_trigger_changes();
            }
            _ => {
                if let Some(old) = old_data {
                    self.remove_section(old);
                }
            }
        }
    }

    fn replace_dynamic(&mut self, old_data: Option<&TranslucentData>, coord: ChunkCoord) {
        self.gfni.remove_chunk(coord);
        self.direct.remove(coord);
        if let Some(old) = old_data {
            self.sort_type_counters[old.sort_type().index()] -= 1;
        }
    }

    /// Removes an unloaded chunk from both indices and decrements its
    /// strategy counter exactly once.
    pub fn remove_section(&mut self, old_data: &TranslucentData) {
        let coord = old_data.coord();
        self.gfni.remove_chunk(coord);
        self.direct.remove(coord);
        self.sort_type_counters[old_data.sort_type().index()] -= 1;
    }

    /// Applies the pending registration changes a dynamic-topo chunk
    /// requested during its last re-sort (GFNI to direct escalation).
    pub fn apply_trigger_changes(&mut self, data: &mut TranslucentData) {
        let TranslucentData::TopoDynamic(topo) = data else {
            return;
        };
        let coord = topo.coord;
        let changes = topo.take_trigger_changes();
        if changes.turn_gfni_off {
            self.gfni.remove_chunk(coord);
            topo.clear_plane_data();
        }
        if changes.turn_direct_on {
            self.direct.add(coord);
        }
        if changes.turn_direct_off {
            self.direct.remove(coord);
        }
    }

    /// Marks a direct-indexed chunk as (not) requiring trigger attention;
    /// skippable subtrees are pruned from movement queries.
    pub fn set_section_skippable(&mut self, coord: ChunkCoord, skippable: bool) {
        if self.direct.octree.contains(coord) {
            self.direct.octree.set_skippable(coord, skippable);
        }
    }

    /// Stamps a direct-indexed chunk visible for frustum-limited queries.
    pub fn mark_section_visible(&mut self, coord: ChunkCoord, frame: u32) {
        self.direct.octree.mark_visible(coord, frame);
    }

    /// True if any direct-indexed chunk marked visible in `frame` intersects
    /// the inclusive chunk-coordinate box.
    pub fn is_box_visible(&self, frame: u32, min: ChunkCoord, max: ChunkCoord) -> bool {
        self.direct.octree.is_box_visible(frame, min, max)
    }

    #[inline]
    pub fn sort_type_count(&self, sort_type: SortType) -> usize {
        self.sort_type_counters[sort_type.index()]
    }

    #[inline]
    pub fn unique_normal_count(&self) -> usize {
        self.gfni.unique_normal_count()
    }

    #[inline]
    pub fn direct_chunk_count(&self) -> usize {
        self.direct.chunk_count()
    }

    /// Two overlay lines summarizing trigger and strategy populations.
    pub fn debug_lines(&self, out: &mut Vec<String>) {
        out.push(format!(
            "TS NL={:02} TrN={:02} TrS=G{:03}/D{:03}",
            self.gfni.unique_normal_count(),
            self.triggered_normal_count,
            self.gfni_trigger_count,
            self.direct_trigger_count,
        ));
        out.push(format!(
            "N={:05} SNR={:05} STA={:04} DYN={:04} (DIR={:04})",
            self.sort_type_counters[SortType::None.index()],
            self.sort_type_counters[SortType::StaticNormalRelative.index()],
            self.sort_type_counters[SortType::StaticTopo.index()],
            self.sort_type_counters[SortType::Dynamic.index()],
            self.direct.chunk_count(),
        ));
        log::debug!(
            "translucency triggers: {} normals, G{}/D{}",
            self.triggered_normal_count,
            self.gfni_trigger_count,
            self.direct_trigger_count
        );
    }
}

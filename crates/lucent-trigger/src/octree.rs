//! Sparse, path-compressed octree over chunk-grid coordinates.
//!
//! Nodes live in an arena and refer to parents and children by index. A node
//! with `ignored_bits = b` covers a cube of `2^b` grid cells per axis whose
//! origin has the low `b` bits cleared. Branches are synthesized at the
//! lowest level that contains both children, and collapsed again when a
//! removal leaves them with a single child, so depth stays logarithmic in
//! the occupied world extent regardless of insertion order.

use lucent_geom::ChunkCoord;

pub type OctreeNodeId = u32;

/// Order-preserving map from signed chunk coordinates into the unsigned
/// space the prefix masks operate on.
#[inline]
fn grid(v: i32) -> u32 {
    (v as u32) ^ 0x8000_0000
}

#[inline]
fn mask(ignored_bits: u8) -> u32 {
    if ignored_bits >= 32 {
        0
    } else {
        u32::MAX << ignored_bits
    }
}

/// Children whose index bit on `axis` equals `sign`, per face of a node.
/// Child indices pack x into bit 0, y into bit 1, z into bit 2.
const FACE_CHILDREN: [[usize; 4]; 6] = [
    [0, 2, 4, 6], // -X
    [1, 3, 5, 7], // +X
    [0, 1, 4, 5], // -Y
    [2, 3, 6, 7], // +Y
    [0, 1, 2, 3], // -Z
    [4, 5, 6, 7], // +Z
];

#[derive(Clone, Debug)]
enum NodeKind {
    Inner {
        children: [Option<OctreeNodeId>; 8],
        child_count: u8,
        first_child: u8,
        skippable_children: u8,
        child_visible_frame: Option<u32>,
    },
    Leaf {
        coord: ChunkCoord,
        skippable: bool,
    },
}

#[derive(Clone, Debug)]
struct Node {
    x: u32,
    y: u32,
    z: u32,
    ignored_bits: u8,
    parent: Option<OctreeNodeId>,
    last_visible_frame: Option<u32>,
    kind: NodeKind,
}

impl Node {
    #[inline]
    fn contains(&self, gx: u32, gy: u32, gz: u32) -> bool {
        let m = mask(self.ignored_bits);
        (gx & m) == self.x && (gy & m) == self.y && (gz & m) == self.z
    }

    #[inline]
    fn size(&self) -> u64 {
        1u64 << self.ignored_bits
    }

    /// Index of the child cell containing the coordinate; only meaningful
    /// for inner nodes.
    #[inline]
    fn child_index(&self, gx: u32, gy: u32, gz: u32) -> usize {
        let selector = 1u32 << (self.ignored_bits - 1);
        usize::from(gx & selector != 0)
            | usize::from(gy & selector != 0) << 1
            | usize::from(gz & selector != 0) << 2
    }

    #[inline]
    fn origin(&self, axis: usize) -> u32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

#[derive(Default)]
pub struct ChunkOctree {
    nodes: Vec<Node>,
    free: Vec<OctreeNodeId>,
    root: Option<OctreeNodeId>,
    len: usize,
}

impl ChunkOctree {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn alloc(&mut self, node: Node) -> OctreeNodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = node;
            id
        } else {
            let id = self.nodes.len() as OctreeNodeId;
            self.nodes.push(node);
            id
        }
    }

    fn release(&mut self, id: OctreeNodeId) {
        self.free.push(id);
    }

    fn new_leaf(&mut self, coord: ChunkCoord) -> OctreeNodeId {
        self.alloc(Node {
            x: grid(coord.cx),
            y: grid(coord.cy),
            z: grid(coord.cz),
            ignored_bits: 0,
            parent: None,
            last_visible_frame: None,
            kind: NodeKind::Leaf {
                coord,
                skippable: false,
            },
        })
    }

    /// True for leaves flagged skippable and for inner nodes all of whose
    /// children are skippable.
    pub fn is_skippable(&self, id: OctreeNodeId) -> bool {
        match &self.nodes[id as usize].kind {
            NodeKind::Leaf { skippable, .. } => *skippable,
            NodeKind::Inner {
                child_count,
                skippable_children,
                ..
            } => skippable_children == child_count,
        }
    }

    pub fn leaf_coord(&self, id: OctreeNodeId) -> Option<ChunkCoord> {
        match &self.nodes[id as usize].kind {
            NodeKind::Leaf { coord, .. } => Some(*coord),
            NodeKind::Inner { .. } => None,
        }
    }

    fn find_leaf(&self, coord: ChunkCoord) -> Option<OctreeNodeId> {
        let (gx, gy, gz) = (grid(coord.cx), grid(coord.cy), grid(coord.cz));
        let mut id = self.root?;
        loop {
            let node = &self.nodes[id as usize];
            if !node.contains(gx, gy, gz) {
                return None;
            }
            match &node.kind {
                NodeKind::Leaf { .. } => return Some(id),
                NodeKind::Inner { children, .. } => {
                    id = children[node.child_index(gx, gy, gz)]?;
                }
            }
        }
    }

    /// The leaf node holding a chunk, if it is present.
    #[inline]
    pub fn leaf_id(&self, coord: ChunkCoord) -> Option<OctreeNodeId> {
        self.find_leaf(coord)
    }

    #[inline]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.find_leaf(coord).is_some()
    }

    /// Inserts a chunk leaf. Inserting a coordinate that is already present
    /// indicates the caller lost track of the index and panics.
    pub fn insert(&mut self, coord: ChunkCoord) {
        let (gx, gy, gz) = (grid(coord.cx), grid(coord.cy), grid(coord.cz));
        match self.root {
            None => {
                let leaf = self.new_leaf(coord);
                self.root = Some(leaf);
            }
            Some(root_id) => {
                if self.nodes[root_id as usize].contains(gx, gy, gz) {
                    self.insert_below(root_id, coord, gx, gy, gz);
                } else {
                    // grow upward: a new branch holds the old root and the
                    // new leaf side by side
                    let leaf = self.new_leaf(coord);
                    let branch = self.make_branch(root_id, leaf);
                    self.root = Some(branch);
                }
            }
        }
        self.len += 1;
    }

    fn insert_below(&mut self, start: OctreeNodeId, coord: ChunkCoord, gx: u32, gy: u32, gz: u32) {
        let mut id = start;
        loop {
            let node = &self.nodes[id as usize];
            debug_assert!(node.contains(gx, gy, gz));
            match &node.kind {
                NodeKind::Leaf { .. } => {
                    panic!("chunk {coord:?} is already present in the octree");
                }
                NodeKind::Inner { children, .. } => {
                    let index = node.child_index(gx, gy, gz);
                    match children[index] {
                        None => {
                            let leaf = self.new_leaf(coord);
                            self.attach_child(id, index, leaf);
                            return;
                        }
                        Some(child) => {
                            if self.nodes[child as usize].contains(gx, gy, gz) {
                                id = child;
                            } else {
                                // the child skips levels; splice in a branch
                                // that contains it and the new leaf
                                let leaf = self.new_leaf(coord);
                                self.detach_child(id, index);
                                let branch = self.make_branch(child, leaf);
                                self.attach_child(id, index, branch);
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Creates the smallest branch node containing both subtrees and
    /// attaches them to it.
    fn make_branch(&mut self, a: OctreeNodeId, b: OctreeNodeId) -> OctreeNodeId {
        let (ax, ay, az) = {
            let n = &self.nodes[a as usize];
            (n.x, n.y, n.z)
        };
        let (bx, by, bz) = {
            let n = &self.nodes[b as usize];
            (n.x, n.y, n.z)
        };
        let diff = (ax ^ bx) | (ay ^ by) | (az ^ bz);
        debug_assert!(diff != 0, "cannot branch over identical origins");
        let bits = (32 - diff.leading_zeros()) as u8;
        let m = mask(bits);
        let branch = self.alloc(Node {
            x: ax & m,
            y: ay & m,
            z: az & m,
            ignored_bits: bits,
            parent: None,
            last_visible_frame: None,
            kind: NodeKind::Inner {
                children: [None; 8],
                child_count: 0,
                first_child: 8,
                skippable_children: 0,
                child_visible_frame: None,
            },
        });
        let branch_node = &self.nodes[branch as usize];
        let ia = branch_node.child_index(ax, ay, az);
        let ib = branch_node.child_index(bx, by, bz);
        assert_ne!(ia, ib, "branch children collapsed onto one slot");
        self.attach_child(branch, ia, a);
        self.attach_child(branch, ib, b);
        branch
    }

    fn attach_child(&mut self, parent: OctreeNodeId, index: usize, child: OctreeNodeId) {
        let child_skippable = self.is_skippable(child);
        let was = self.is_skippable(parent);
        {
            let node = &mut self.nodes[parent as usize];
            let NodeKind::Inner {
                children,
                child_count,
                first_child,
                skippable_children,
                ..
            } = &mut node.kind
            else {
                panic!("attach_child on a leaf");
            };
            debug_assert!(children[index].is_none());
            children[index] = Some(child);
            *child_count += 1;
            *skippable_children += u8::from(child_skippable);
            *first_child = (*first_child).min(index as u8);
        }
        self.nodes[child as usize].parent = Some(parent);
        let now = self.is_skippable(parent);
        if was != now {
            self.propagate_skippable_flip(parent, now);
        }
    }

    fn detach_child(&mut self, parent: OctreeNodeId, index: usize) -> OctreeNodeId {
        let was = self.is_skippable(parent);
        let child = {
            let node = &self.nodes[parent as usize];
            let NodeKind::Inner { children, .. } = &node.kind else {
                panic!("detach_child on a leaf");
            };
            children[index].expect("detaching an empty child slot")
        };
        let child_skippable = self.is_skippable(child);
        {
            let node = &mut self.nodes[parent as usize];
            let NodeKind::Inner {
                children,
                child_count,
                first_child,
                skippable_children,
                ..
            } = &mut node.kind
            else {
                unreachable!()
            };
            children[index] = None;
            *child_count -= 1;
            *skippable_children -= u8::from(child_skippable);
            if *first_child == index as u8 {
                *first_child = children
                    .iter()
                    .position(Option::is_some)
                    .map_or(8, |i| i as u8);
            }
        }
        self.nodes[child as usize].parent = None;
        let now = self.is_skippable(parent);
        if was != now {
            self.propagate_skippable_flip(parent, now);
        }
        child
    }

    /// A node's skippable status changed; walk up adjusting counts until an
    /// ancestor's own status is unaffected.
    fn propagate_skippable_flip(&mut self, node: OctreeNodeId, mut became_skippable: bool) {
        let mut current = node;
        while let Some(parent) = self.nodes[current as usize].parent {
            let was = self.is_skippable(parent);
            {
                let NodeKind::Inner {
                    skippable_children, ..
                } = &mut self.nodes[parent as usize].kind
                else {
                    unreachable!()
                };
                if became_skippable {
                    *skippable_children += 1;
                } else {
                    *skippable_children -= 1;
                }
            }
            let now = self.is_skippable(parent);
            if was == now {
                break;
            }
            became_skippable = now;
            current = parent;
        }
    }

    /// Removes a chunk leaf, collapsing any branch left with a single child.
    /// Removing an absent coordinate panics.
    pub fn remove(&mut self, coord: ChunkCoord) {
        let leaf = self
            .find_leaf(coord)
            .unwrap_or_else(|| panic!("chunk {coord:?} is not present in the octree"));
        let parent = self.nodes[leaf as usize].parent;
        match parent {
            None => {
                self.root = None;
                self.release(leaf);
            }
            Some(parent_id) => {
                let index = {
                    let node = &self.nodes[leaf as usize];
                    self.nodes[parent_id as usize].child_index(node.x, node.y, node.z)
                };
                self.detach_child(parent_id, index);
                self.release(leaf);
                self.collapse_if_singleton(parent_id);
            }
        }
        self.len -= 1;
    }

    fn collapse_if_singleton(&mut self, id: OctreeNodeId) {
        let (child_count, only_index) = match &self.nodes[id as usize].kind {
            NodeKind::Inner {
                child_count,
                first_child,
                ..
            } => (*child_count, *first_child as usize),
            NodeKind::Leaf { .. } => return,
        };
        if child_count != 1 {
            return;
        }
        let grand = self.nodes[id as usize].parent;
        let only = self.detach_child(id, only_index);
        match grand {
            None => {
                self.root = Some(only);
                self.nodes[only as usize].parent = None;
                self.release(id);
            }
            Some(grand_id) => {
                let index = {
                    let node = &self.nodes[id as usize];
                    self.nodes[grand_id as usize].child_index(node.x, node.y, node.z)
                };
                self.detach_child(grand_id, index);
                self.release(id);
                self.attach_child(grand_id, index, only);
            }
        }
    }

    /// Flags a chunk's leaf as (not) requiring trigger attention and updates
    /// ancestor skippable counts.
    pub fn set_skippable(&mut self, coord: ChunkCoord, value: bool) {
        let leaf = self
            .find_leaf(coord)
            .unwrap_or_else(|| panic!("chunk {coord:?} is not present in the octree"));
        let changed = {
            let NodeKind::Leaf { skippable, .. } = &mut self.nodes[leaf as usize].kind else {
                unreachable!()
            };
            let changed = *skippable != value;
            *skippable = value;
            changed
        };
        if changed {
            self.propagate_skippable_flip(leaf, value);
        }
    }

    /// Stamps a chunk's leaf as visible in the given frame and records the
    /// frame on every ancestor for early-out box queries.
    pub fn mark_visible(&mut self, coord: ChunkCoord, frame: u32) {
        let Some(leaf) = self.find_leaf(coord) else {
            return;
        };
        self.nodes[leaf as usize].last_visible_frame = Some(frame);
        let mut current = self.nodes[leaf as usize].parent;
        while let Some(id) = current {
            let node = &mut self.nodes[id as usize];
            let NodeKind::Inner {
                child_visible_frame,
                ..
            } = &mut node.kind
            else {
                unreachable!()
            };
            if *child_visible_frame == Some(frame) {
                break;
            }
            *child_visible_frame = Some(frame);
            current = node.parent;
        }
    }

    /// True if any chunk marked visible in `frame` intersects the inclusive
    /// chunk-coordinate box.
    pub fn is_box_visible(&self, frame: u32, min: ChunkCoord, max: ChunkCoord) -> bool {
        let lo = (grid(min.cx), grid(min.cy), grid(min.cz));
        let hi = (grid(max.cx), grid(max.cy), grid(max.cz));
        match self.root {
            None => false,
            Some(root) => self.box_visible_node(root, frame, lo, hi),
        }
    }

    fn intersects_box(&self, id: OctreeNodeId, lo: (u32, u32, u32), hi: (u32, u32, u32)) -> bool {
        let node = &self.nodes[id as usize];
        let size = node.size();
        let lo = [lo.0, lo.1, lo.2];
        let hi = [hi.0, hi.1, hi.2];
        (0..3).all(|axis| {
            let origin = u64::from(node.origin(axis));
            u64::from(lo[axis]) < origin + size && u64::from(hi[axis]) >= origin
        })
    }

    fn box_visible_node(
        &self,
        id: OctreeNodeId,
        frame: u32,
        lo: (u32, u32, u32),
        hi: (u32, u32, u32),
    ) -> bool {
        let node = &self.nodes[id as usize];
        match &node.kind {
            NodeKind::Leaf { .. } => {
                node.last_visible_frame == Some(frame) && self.intersects_box(id, lo, hi)
            }
            NodeKind::Inner {
                children,
                child_visible_frame,
                first_child,
                child_count,
                ..
            } => {
                if *child_visible_frame != Some(frame) || !self.intersects_box(id, lo, hi) {
                    return false;
                }
                let mut remaining = *child_count;
                for index in (*first_child as usize)..8 {
                    if remaining == 0 {
                        break;
                    }
                    if let Some(child) = children[index] {
                        remaining -= 1;
                        if self.box_visible_node(child, frame, lo, hi) {
                            return true;
                        }
                    }
                }
                false
            }
        }
    }

    /// Enumerates descendants touching one axis-aligned face of `id`'s cube.
    /// With `accept_skippable`, a fully skippable subtree is reported as one
    /// node instead of descending into it.
    pub fn iterate_face_nodes(
        &self,
        id: OctreeNodeId,
        axis: usize,
        sign: i32,
        accept_skippable: bool,
        f: &mut dyn FnMut(OctreeNodeId),
    ) {
        if accept_skippable && self.is_skippable(id) {
            f(id);
            return;
        }
        let node = &self.nodes[id as usize];
        let NodeKind::Inner { children, .. } = &node.kind else {
            f(id);
            return;
        };
        let face = axis * 2 + usize::from(sign > 0);
        for &index in &FACE_CHILDREN[face] {
            let Some(child) = children[index] else {
                continue;
            };
            let child_node = &self.nodes[child as usize];
            // a child that skips levels may sit anywhere inside this cell
            // and not actually reach the parent's face
            if child_node.ignored_bits + 1 < node.ignored_bits {
                let touches = if sign > 0 {
                    u64::from(child_node.origin(axis)) + child_node.size()
                        == u64::from(node.origin(axis)) + node.size()
                } else {
                    child_node.origin(axis) == node.origin(axis)
                };
                if !touches {
                    continue;
                }
            }
            self.iterate_face_nodes(child, axis, sign, accept_skippable, f);
        }
    }

    pub fn root(&self) -> Option<OctreeNodeId> {
        self.root
    }

    pub fn for_each_leaf(&self, f: &mut dyn FnMut(ChunkCoord)) {
        if let Some(root) = self.root {
            self.each_leaf_node(root, &mut |id| {
                if let Some(coord) = self.leaf_coord(id) {
                    f(coord);
                }
            });
        }
    }

    fn each_leaf_node(&self, id: OctreeNodeId, f: &mut dyn FnMut(OctreeNodeId)) {
        match &self.nodes[id as usize].kind {
            NodeKind::Leaf { .. } => f(id),
            NodeKind::Inner { children, .. } => {
                for child in children.iter().flatten() {
                    self.each_leaf_node(*child, f);
                }
            }
        }
    }

    /// Visits every leaf still requiring trigger attention, pruning fully
    /// skippable subtrees without descending into them.
    pub fn for_each_unskippable_leaf(&self, f: &mut dyn FnMut(ChunkCoord)) {
        if let Some(root) = self.root {
            self.each_unskippable_node(root, f);
        }
    }

    fn each_unskippable_node(&self, id: OctreeNodeId, f: &mut dyn FnMut(ChunkCoord)) {
        if self.is_skippable(id) {
            return;
        }
        match &self.nodes[id as usize].kind {
            NodeKind::Leaf { coord, .. } => f(*coord),
            NodeKind::Inner { children, .. } => {
                for child in children.iter().flatten() {
                    self.each_unskippable_node(*child, f);
                }
            }
        }
    }

    /// Visits every non-skippable leaf whose cube intersects the inclusive
    /// chunk-coordinate box, pruning skippable subtrees.
    pub fn visit_intersecting(
        &self,
        min: ChunkCoord,
        max: ChunkCoord,
        f: &mut dyn FnMut(ChunkCoord),
    ) {
        let lo = (grid(min.cx), grid(min.cy), grid(min.cz));
        let hi = (grid(max.cx), grid(max.cy), grid(max.cz));
        if let Some(root) = self.root {
            self.visit_intersecting_node(root, lo, hi, f);
        }
    }

    fn visit_intersecting_node(
        &self,
        id: OctreeNodeId,
        lo: (u32, u32, u32),
        hi: (u32, u32, u32),
        f: &mut dyn FnMut(ChunkCoord),
    ) {
        if self.is_skippable(id) || !self.intersects_box(id, lo, hi) {
            return;
        }
        match &self.nodes[id as usize].kind {
            NodeKind::Leaf { coord, .. } => f(*coord),
            NodeKind::Inner { children, .. } => {
                for child in children.iter().flatten() {
                    self.visit_intersecting_node(*child, lo, hi, f);
                }
            }
        }
    }

    /// Structural invariant check used by tests: parent links, child counts,
    /// skippable counts, containment, and the no-singleton-branch rule that
    /// removal must maintain (the root included).
    pub fn validate(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree with nonzero length");
            return;
        };
        assert!(self.nodes[root as usize].parent.is_none());
        let mut leaves = 0usize;
        self.validate_node(root, &mut leaves);
        assert_eq!(leaves, self.len, "leaf count does not match length");
    }

    fn validate_node(&self, id: OctreeNodeId, leaves: &mut usize) {
        let node = &self.nodes[id as usize];
        match &node.kind {
            NodeKind::Leaf { coord, .. } => {
                assert_eq!(node.ignored_bits, 0);
                assert_eq!(grid(coord.cx), node.x);
                assert_eq!(grid(coord.cy), node.y);
                assert_eq!(grid(coord.cz), node.z);
                *leaves += 1;
            }
            NodeKind::Inner {
                children,
                child_count,
                first_child,
                skippable_children,
                ..
            } => {
                let present: Vec<OctreeNodeId> = children.iter().flatten().copied().collect();
                assert_eq!(present.len(), *child_count as usize);
                assert!(
                    *child_count >= 2,
                    "inner node {id} left with {child_count} child(ren)"
                );
                let first = children
                    .iter()
                    .position(Option::is_some)
                    .map_or(8, |i| i as u8);
                assert_eq!(first, *first_child);
                let skippable = present.iter().filter(|&&c| self.is_skippable(c)).count();
                assert_eq!(skippable, *skippable_children as usize);
                for &child in &present {
                    let child_node = &self.nodes[child as usize];
                    assert_eq!(child_node.parent, Some(id));
                    assert!(child_node.ignored_bits < node.ignored_bits);
                    assert!(node.contains(child_node.x, child_node.y, child_node.z));
                    self.validate_node(child, leaves);
                }
            }
        }
    }
}

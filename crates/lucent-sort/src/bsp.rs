//! Binary partition tree over a chunk's translucent quads.
//!
//! Branch nodes store a partition plane and emit quads back-to-front by
//! visiting the far side first. Subtrees whose quad content did not change
//! between builds are copied over from the previous tree instead of being
//! re-partitioned.

use std::fmt;

use hashbrown::HashMap;
use lucent_geom::{ChunkCoord, Vec3};

use crate::group::GeometryPlanes;
use crate::quad::{Facing, Quad};
use crate::topo;

/// Number of times a chunk must have been built before subtree reuse is
/// attempted on the next rebuild.
pub const NODE_REUSE_MIN_GENERATION: u32 = 1;

/// Tolerance for classifying a quad against a partition plane.
const PLANE_EPSILON: f32 = 1.0 / 512.0;

pub type NodeId = u32;

#[derive(Clone, Debug)]
enum BspNode {
    /// Quads needing no further split, emitted in stored order.
    Leaf { indexes: Vec<u32> },
    Inner {
        facing: Facing,
        normal: Vec3,
        distance: f32,
        back: Option<NodeId>,
        front: Option<NodeId>,
        on_plane: Vec<u32>,
    },
}

/// Per-node reuse bookkeeping: the sorted quad indexes of the subtree and a
/// combined content hash over those quads.
#[derive(Clone, Debug)]
struct NodeMeta {
    indexes: Vec<u32>,
    hash: u64,
}

#[derive(Clone, Debug)]
pub struct BspTree {
    nodes: Vec<BspNode>,
    meta: Vec<NodeMeta>,
    root: NodeId,
}

impl BspTree {
    /// Emits the draw order for the given camera position into `out`,
    /// back-to-front: far side of each partition plane, then the coplanar
    /// quads, then the near side.
    pub fn collect_sorted_quads(&self, camera: Vec3, out: &mut Vec<u32>) {
        out.clear();
        self.collect_node(self.root, camera, out);
    }

    fn collect_node(&self, id: NodeId, camera: Vec3, out: &mut Vec<u32>) {
        match &self.nodes[id as usize] {
            BspNode::Leaf { indexes } => out.extend_from_slice(indexes),
            BspNode::Inner {
                normal,
                distance,
                back,
                front,
                on_plane,
                ..
            } => {
                let camera_in_front = normal.dot(camera) > *distance;
                let (far, near) = if camera_in_front {
                    (*back, *front)
                } else {
                    (*front, *back)
                };
                if let Some(far) = far {
                    self.collect_node(far, camera, out);
                }
                out.extend_from_slice(on_plane);
                if let Some(near) = near {
                    self.collect_node(near, camera, out);
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// A built tree plus the partition planes that must be registered with the
/// trigger system.
#[derive(Debug)]
pub struct BspResult {
    pub tree: BspTree,
    pub planes: GeometryPlanes,
}

/// The partitioner could not order the quads: no candidate plane separates
/// them and the topological fallback found a visibility cycle. Callers fall
/// back to a dynamic topo strategy; this is never fatal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BspBuildError {
    pub coord: ChunkCoord,
}

impl fmt::Display for BspBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BSP build failure at chunk ({}, {}, {})",
            self.coord.cx, self.coord.cy, self.coord.cz
        )
    }
}

impl std::error::Error for BspBuildError {}

enum Side {
    Back,
    Front,
    On,
    Straddle,
}

fn classify(quad: &Quad, normal: Vec3, distance: f32) -> Side {
    let (lo, hi) = quad.dot_interval(normal);
    if lo >= distance - PLANE_EPSILON && hi <= distance + PLANE_EPSILON {
        Side::On
    } else if hi <= distance + PLANE_EPSILON {
        Side::Back
    } else if lo >= distance - PLANE_EPSILON {
        Side::Front
    } else {
        Side::Straddle
    }
}

struct Partition {
    facing: Facing,
    normal: Vec3,
    distance: f32,
    back: Vec<u32>,
    front: Vec<u32>,
    on_plane: Vec<u32>,
}

struct Builder<'a> {
    coord: ChunkCoord,
    quads: &'a [Quad],
    nodes: Vec<BspNode>,
    meta: Vec<NodeMeta>,
    planes: GeometryPlanes,
    old: Option<(&'a BspTree, HashMap<u64, NodeId>)>,
}

pub fn build_bsp(
    coord: ChunkCoord,
    quads: &[Quad],
    old_tree: Option<&BspTree>,
    prepare_reuse: bool,
) -> Result<BspResult, BspBuildError> {
    let old = match (old_tree, prepare_reuse) {
        (Some(tree), true) => {
            let mut by_hash = HashMap::with_capacity(tree.meta.len());
            for (id, meta) in tree.meta.iter().enumerate() {
                by_hash.entry(meta.hash).or_insert(id as NodeId);
            }
            Some((tree, by_hash))
        }
        _ => None,
    };
    let mut builder = Builder {
        coord,
        quads,
        nodes: Vec::new(),
        meta: Vec::new(),
        planes: GeometryPlanes::new(),
        old,
    };
    let all: Vec<u32> = (0..quads.len() as u32).collect();
    let root = builder.build_node(all)?;
    Ok(BspResult {
        tree: BspTree {
            nodes: builder.nodes,
            meta: builder.meta,
            root,
        },
        planes: builder.planes,
    })
}

impl<'a> Builder<'a> {
    fn subtree_meta(&self, indexes: &[u32]) -> NodeMeta {
        let mut sorted = indexes.to_vec();
        sorted.sort_unstable();
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        for &i in &sorted {
            hash = hash
                .wrapping_mul(0x100_0000_01b3)
                .wrapping_add(self.quads[i as usize].content_hash())
                .wrapping_add(u64::from(i));
        }
        hash = hash
            .wrapping_mul(0x100_0000_01b3)
            .wrapping_add(sorted.len() as u64);
        NodeMeta {
            indexes: sorted,
            hash,
        }
    }

    fn push(&mut self, node: BspNode, meta: NodeMeta) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        self.meta.push(meta);
        id
    }

    fn build_node(&mut self, indexes: Vec<u32>) -> Result<NodeId, BspBuildError> {
        let meta = self.subtree_meta(&indexes);

        let reuse = match &self.old {
            Some((old_tree, by_hash)) => match by_hash.get(&meta.hash) {
                Some(&old_id)
                    if old_tree.meta[old_id as usize].indexes == meta.indexes =>
                {
                    Some((*old_tree, old_id))
                }
                _ => None,
            },
            None => None,
        };
        if let Some((old_tree, old_id)) = reuse {
            return Ok(self.copy_subtree(old_tree, old_id));
        }

        if indexes.len() <= 1 || self.all_coplanar(&indexes) {
            return Ok(self.push(BspNode::Leaf { indexes }, meta));
        }

        if let Some(part) = self.choose_partition(&indexes) {
            if part.facing.is_aligned() {
                self.planes
                    .add_aligned_plane(self.coord, part.facing, part.distance);
            } else {
                self.planes
                    .add_unaligned_plane(self.coord, part.normal, part.distance);
            }
            let back = if part.back.is_empty() {
                None
            } else {
                Some(self.build_node(part.back)?)
            };
            let front = if part.front.is_empty() {
                None
            } else {
                Some(self.build_node(part.front)?)
            };
            return Ok(self.push(
                BspNode::Inner {
                    facing: part.facing,
                    normal: part.normal,
                    distance: part.distance,
                    back,
                    front,
                    on_plane: part.on_plane,
                },
                meta,
            ));
        }

        // No plane separates this set. A topologically ordered leaf is still
        // valid from every viewpoint; a cycle there means the geometry cannot
        // be ordered without splitting quads, which we do not do.
        let subset: Vec<Quad> = indexes
            .iter()
            .map(|&i| self.quads[i as usize].clone())
            .collect();
        match topo::topo_sort(&subset) {
            Some(order) => {
                let ordered: Vec<u32> = order.into_iter().map(|k| indexes[k as usize]).collect();
                Ok(self.push(BspNode::Leaf { indexes: ordered }, meta))
            }
            None => Err(BspBuildError { coord: self.coord }),
        }
    }

    fn all_coplanar(&self, indexes: &[u32]) -> bool {
        let first = &self.quads[indexes[0] as usize];
        indexes.iter().all(|&i| {
            let q = &self.quads[i as usize];
            q.quantized == first.quantized
                && (q.dot_product - first.dot_product).abs() <= PLANE_EPSILON
        })
    }

    fn try_plane(
        &self,
        indexes: &[u32],
        facing: Facing,
        normal: Vec3,
        distance: f32,
    ) -> Option<Partition> {
        let mut back = Vec::new();
        let mut front = Vec::new();
        let mut on_plane = Vec::new();
        for &i in indexes {
            match classify(&self.quads[i as usize], normal, distance) {
                Side::Back => back.push(i),
                Side::Front => front.push(i),
                Side::On => on_plane.push(i),
                Side::Straddle => return None,
            }
        }
        // require progress: the recursion must shrink on both sides
        if on_plane.is_empty() && (back.is_empty() || front.is_empty()) {
            return None;
        }
        Some(Partition {
            facing,
            normal,
            distance,
            back,
            front,
            on_plane,
        })
    }

    fn choose_partition(&self, indexes: &[u32]) -> Option<Partition> {
        // aligned candidates first: distinct plane coordinates per axis
        for axis in 0..3 {
            let facing = Facing::from_index(axis);
            let normal = facing.normal();
            let mut coords: Vec<f32> = indexes
                .iter()
                .map(|&i| &self.quads[i as usize])
                .filter(|q| q.facing.is_aligned() && q.facing.axis() == axis)
                .map(|q| q.facing.sign() as f32 * q.dot_product)
                .collect();
            coords.sort_by(f32::total_cmp);
            coords.dedup_by(|a, b| (*a - *b).abs() <= PLANE_EPSILON);
            for d in coords {
                if let Some(part) = self.try_plane(indexes, facing, normal, d) {
                    return Some(part);
                }
            }
        }
        // then each unaligned quad's own plane, in index order
        for &i in indexes {
            let q = &self.quads[i as usize];
            if q.facing.is_aligned() {
                continue;
            }
            if let Some(part) =
                self.try_plane(indexes, Facing::Unaligned, q.normal, q.dot_product)
            {
                return Some(part);
            }
        }
        None
    }

    fn copy_subtree(&mut self, old_tree: &BspTree, old_id: NodeId) -> NodeId {
        let meta = old_tree.meta[old_id as usize].clone();
        match &old_tree.nodes[old_id as usize] {
            BspNode::Leaf { indexes } => {
                let node = BspNode::Leaf {
                    indexes: indexes.clone(),
                };
                self.push(node, meta)
            }
            BspNode::Inner {
                facing,
                normal,
                distance,
                back,
                front,
                on_plane,
            } => {
                let (facing, normal, distance) = (*facing, *normal, *distance);
                let (back, front, on_plane) = (*back, *front, on_plane.clone());
                if facing.is_aligned() {
                    self.planes.add_aligned_plane(self.coord, facing, distance);
                } else {
                    self.planes.add_unaligned_plane(self.coord, normal, distance);
                }
                let back = back.map(|b| self.copy_subtree(old_tree, b));
                let front = front.map(|f| self.copy_subtree(old_tree, f));
                self.push(
                    BspNode::Inner {
                        facing,
                        normal,
                        distance,
                        back,
                        front,
                        on_plane,
                    },
                    meta,
                )
            }
        }
    }
}

//! Camera-independent topological ordering of translucent quads.
//!
//! A quad `a` must be painted before quad `b` whenever some viewpoint can see
//! `a` through `b`. The test below over-approximates that relation with two
//! half-space checks on the quads' bounding extents; it may manufacture
//! cycles (forcing the caller onto a dynamic strategy) but can never hide a
//! real occlusion.

use lucent_geom::Vec3;

use crate::quad::Quad;

/// Separation tolerance for the half-space tests. Quads within this distance
/// of a plane count as coplanar and create no ordering edge.
const HALFSPACE_EPSILON: f32 = 1.0 / 512.0;

/// True if `a` can be seen through `b` from some camera position: part of
/// `a` lies behind `b`'s plane while part of `b` lies in front of `a`'s.
fn visible_through(a: &Quad, b: &Quad) -> bool {
    let (a_lo, _) = a.dot_interval(b.normal);
    if a_lo >= b.dot_product - HALFSPACE_EPSILON {
        return false;
    }
    let (_, b_hi) = b.dot_interval(a.normal);
    b_hi > a.dot_product + HALFSPACE_EPSILON
}

/// Attempts a topological sort of the quads into a back-to-front order valid
/// from every viewpoint. Returns `None` when the visibility graph is cyclic.
pub fn topo_sort(quads: &[Quad]) -> Option<Vec<u32>> {
    let n = quads.len();
    if n <= 1 {
        return Some((0..n as u32).collect());
    }

    // edge a -> b: a must be emitted before b
    let mut successors: Vec<Vec<u32>> = vec![Vec::new(); n];
    let mut in_degree: Vec<u32> = vec![0; n];
    for i in 0..n {
        for j in 0..n {
            if i != j && visible_through(&quads[i], &quads[j]) {
                successors[i].push(j as u32);
                in_degree[j] += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut ready: Vec<u32> = (0..n as u32)
        .filter(|&i| in_degree[i as usize] == 0)
        .collect();
    // pop from the front for a deterministic, index-ascending tie order
    let mut next = 0;
    while next < ready.len() {
        let i = ready[next];
        next += 1;
        order.push(i);
        for &j in &successors[i as usize] {
            in_degree[j as usize] -= 1;
            if in_degree[j as usize] == 0 {
                ready.push(j);
            }
        }
    }

    if order.len() == n { Some(order) } else { None }
}

/// Back-to-front order by distance from the camera to each quad center.
/// Used when the topological sort fails on a dynamically sorted chunk.
pub fn distance_sort(quads: &[Quad], camera: Vec3) -> Vec<u32> {
    let mut order: Vec<u32> = (0..quads.len() as u32).collect();
    order.sort_by(|&a, &b| {
        let da = (quads[a as usize].center - camera).length_sq();
        let db = (quads[b as usize].center - camera).length_sq();
        db.total_cmp(&da)
    });
    order
}

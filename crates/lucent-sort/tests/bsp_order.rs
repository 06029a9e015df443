use lucent_geom::{ChunkCoord, Vec3};
use lucent_sort::{Facing, Quad, build_bsp};

fn pane(facing: Facing, plane: f32) -> Quad {
    let mut extents = [16.0, 16.0, 16.0, 0.0, 0.0, 0.0];
    let axis = facing.axis();
    extents[axis] = plane;
    extents[axis + 3] = plane;
    Quad::from_aligned(facing, extents)
}

/// Checks the painter invariant: any quad strictly behind another quad's
/// plane (with the camera strictly in front of it) must be emitted first.
fn assert_back_to_front(quads: &[Quad], order: &[u32], camera: Vec3) {
    assert_eq!(order.len(), quads.len());
    let mut position = vec![0usize; quads.len()];
    for (pos, &i) in order.iter().enumerate() {
        position[i as usize] = pos;
    }
    const EPS: f32 = 1.0 / 256.0;
    for (y, front) in quads.iter().enumerate() {
        let side = front.normal.dot(camera) - front.dot_product;
        if side.abs() <= EPS {
            continue;
        }
        for (x, behind) in quads.iter().enumerate() {
            if x == y {
                continue;
            }
            let (lo, hi) = behind.dot_interval(front.normal);
            let is_behind = if side > 0.0 {
                hi < front.dot_product - EPS
            } else {
                lo > front.dot_product + EPS
            };
            if is_behind {
                assert!(
                    position[x] < position[y],
                    "quad {x} is behind quad {y} but drawn later (camera {camera:?})"
                );
            }
        }
    }
}

fn cameras() -> Vec<Vec3> {
    vec![
        Vec3::new(8.0, 40.0, 8.0),
        Vec3::new(8.0, -40.0, 8.0),
        Vec3::new(40.0, 8.0, 8.0),
        Vec3::new(-40.0, 8.0, 8.0),
        Vec3::new(8.0, 8.0, 40.0),
        Vec3::new(8.0, 8.0, -40.0),
        Vec3::new(3.0, 7.5, 11.0),
    ]
}

#[test]
fn stacked_panes_emit_back_to_front_from_both_sides() {
    let quads: Vec<Quad> = [2.0, 5.0, 9.0, 13.0]
        .iter()
        .map(|&p| pane(Facing::PosY, p))
        .collect();
    let result = build_bsp(ChunkCoord::new(0, 0, 0), &quads, None, false).unwrap();
    let mut order = Vec::new();
    for camera in cameras() {
        result.tree.collect_sorted_quads(camera, &mut order);
        assert_back_to_front(&quads, &order, camera);
    }
}

#[test]
fn mixed_axes_emit_back_to_front() {
    let quads = vec![
        pane(Facing::PosY, 4.0),
        pane(Facing::PosY, 12.0),
        // +X pane confined between the two +Y planes so nothing crosses
        Quad::from_aligned(Facing::PosX, [3.0, 11.0, 16.0, 3.0, 5.0, 0.0]),
        pane(Facing::NegY, 2.0),
    ];
    let result = build_bsp(ChunkCoord::new(0, 0, 0), &quads, None, false).unwrap();
    let mut order = Vec::new();
    for camera in cameras() {
        result.tree.collect_sorted_quads(camera, &mut order);
        assert_back_to_front(&quads, &order, camera);
    }
}

#[test]
fn partition_planes_are_reported_for_triggering() {
    let quads: Vec<Quad> = [2.0, 5.0, 9.0].iter().map(|&p| pane(Facing::PosY, p)).collect();
    let result = build_bsp(ChunkCoord::new(0, 0, 0), &quads, None, false).unwrap();
    // splitting three parallel panes needs at least two partition planes
    assert!(result.planes.plane_count() >= 2);
    assert!(!result.planes.is_empty());
}

#[test]
fn unchanged_geometry_reuses_subtrees() {
    let quads: Vec<Quad> = (0..12).map(|i| pane(Facing::PosY, i as f32 + 0.5)).collect();
    let coord = ChunkCoord::new(1, 0, -2);
    let first = build_bsp(coord, &quads, None, false).unwrap();
    let second = build_bsp(coord, &quads, Some(&first.tree), true).unwrap();
    // the whole tree is unchanged, so the rebuild is a verbatim copy
    assert_eq!(first.tree.node_count(), second.tree.node_count());
    let mut a = Vec::new();
    let mut b = Vec::new();
    for camera in cameras() {
        first.tree.collect_sorted_quads(camera, &mut a);
        second.tree.collect_sorted_quads(camera, &mut b);
        assert_eq!(a, b);
    }
    // reused partition planes still register for triggering
    assert_eq!(
        first.planes.plane_count(),
        second.planes.plane_count()
    );
}

#[test]
fn changed_geometry_still_sorts_correctly_after_partial_rebuild() {
    let mut quads: Vec<Quad> = (0..12).map(|i| pane(Facing::PosY, i as f32 + 0.5)).collect();
    let coord = ChunkCoord::new(0, 0, 0);
    let first = build_bsp(coord, &quads, None, false).unwrap();
    // swap the last pane for a +X pane sitting above every +Y plane
    quads[11] = Quad::from_aligned(Facing::PosX, [6.0, 16.0, 16.0, 6.0, 12.0, 0.0]);
    let second = build_bsp(coord, &quads, Some(&first.tree), true).unwrap();
    let mut order = Vec::new();
    for camera in cameras() {
        second.tree.collect_sorted_quads(camera, &mut order);
        assert_back_to_front(&quads, &order, camera);
    }
}

#[test]
fn crossing_panes_fail_the_build_with_chunk_coordinates() {
    let a = Quad::from_aligned(Facing::PosX, [8.0, 16.0, 16.0, 8.0, 0.0, 0.0]);
    let b = Quad::from_aligned(Facing::PosZ, [16.0, 16.0, 8.0, 0.0, 0.0, 8.0]);
    let err = build_bsp(ChunkCoord::new(3, -1, 7), &[a, b], None, false).unwrap_err();
    assert_eq!(err.coord, ChunkCoord::new(3, -1, 7));
    let message = err.to_string();
    assert!(message.contains("3") && message.contains("-1") && message.contains("7"));
}

#[test]
fn coplanar_quads_build_a_single_leaf() {
    let quads = vec![pane(Facing::PosY, 4.0), pane(Facing::PosY, 4.0)];
    let result = build_bsp(ChunkCoord::new(0, 0, 0), &quads, None, false).unwrap();
    let mut order = Vec::new();
    result.tree.collect_sorted_quads(Vec3::new(8.0, 20.0, 8.0), &mut order);
    assert_eq!(order, vec![0, 1]);
    assert!(result.planes.is_empty());
}

use lucent_geom::ChunkCoord;
use lucent_trigger::ChunkOctree;

fn coords(list: &[(i32, i32, i32)]) -> Vec<ChunkCoord> {
    list.iter().map(|&(x, y, z)| ChunkCoord::new(x, y, z)).collect()
}

#[test]
fn insert_then_remove_in_any_order_empties_the_tree() {
    let all = coords(&[
        (0, 0, 0),
        (1, 0, 0),
        (0, 1, 0),
        (7, 3, -2),
        (-1, -1, -1),
        (100, 0, -100),
        (-64, 5, 33),
    ]);
    // forward, reverse, and interleaved removal orders
    let orders: Vec<Vec<usize>> = vec![
        (0..all.len()).collect(),
        (0..all.len()).rev().collect(),
        vec![3, 0, 6, 1, 5, 2, 4],
    ];
    for order in orders {
        let mut tree = ChunkOctree::new();
        for &c in &all {
            tree.insert(c);
            tree.validate();
        }
        assert_eq!(tree.len(), all.len());
        for &c in &all {
            let leaf = tree.leaf_id(c).expect("inserted chunk has a leaf");
            assert_eq!(tree.leaf_coord(leaf), Some(c));
        }
        assert!(tree.leaf_id(ChunkCoord::new(4, 4, 4)).is_none());
        for &i in &order {
            tree.remove(all[i]);
            tree.validate();
            assert!(!tree.contains(all[i]));
        }
        assert!(tree.is_empty());
    }
}

#[test]
#[should_panic(expected = "already present")]
fn double_insert_fails_fast() {
    let mut tree = ChunkOctree::new();
    tree.insert(ChunkCoord::new(2, 2, 2));
    tree.insert(ChunkCoord::new(2, 2, 2));
}

#[test]
#[should_panic(expected = "not present")]
fn removing_an_absent_chunk_fails_fast() {
    let mut tree = ChunkOctree::new();
    tree.insert(ChunkCoord::new(0, 0, 0));
    tree.remove(ChunkCoord::new(1, 0, 0));
}

#[test]
fn skippable_propagates_up_and_back_down() {
    let mut tree = ChunkOctree::new();
    let all = coords(&[(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 1)]);
    for &c in &all {
        tree.insert(c);
    }
    let root = tree.root().unwrap();
    assert!(!tree.is_skippable(root));
    for &c in &all {
        tree.set_skippable(c, true);
        tree.validate();
    }
    assert!(tree.is_skippable(root));
    tree.set_skippable(all[2], false);
    tree.validate();
    assert!(!tree.is_skippable(root));
}

#[test]
fn removal_never_leaves_a_singleton_branch() {
    // removing the far chunk must collapse its branch; the root keeping a
    // single child afterwards would be the historical collapse bug
    let mut tree = ChunkOctree::new();
    tree.insert(ChunkCoord::new(0, 0, 0));
    tree.insert(ChunkCoord::new(1, 0, 0));
    tree.insert(ChunkCoord::new(50, 0, 0));
    tree.validate();
    tree.remove(ChunkCoord::new(50, 0, 0));
    tree.validate();
    assert_eq!(tree.len(), 2);
    tree.remove(ChunkCoord::new(0, 0, 0));
    tree.validate();
    assert_eq!(tree.len(), 1);
    assert!(tree.contains(ChunkCoord::new(1, 0, 0)));
}

#[test]
fn face_iteration_selects_the_matching_half() {
    let mut tree = ChunkOctree::new();
    let all = coords(&[(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)]);
    for &c in &all {
        tree.insert(c);
    }
    let root = tree.root().unwrap();

    let mut collect = |axis: usize, sign: i32| {
        let mut found = Vec::new();
        tree.iterate_face_nodes(root, axis, sign, false, &mut |id| {
            found.push(tree.leaf_coord(id).unwrap());
        });
        found.sort_by_key(|c| (c.cx, c.cy, c.cz));
        found
    };

    // every chunk sits on the z=0 slab, so all four touch the -Z face
    assert_eq!(collect(2, -1), coords(&[(0, 0, 0), (0, 1, 0), (1, 0, 0), (1, 1, 0)]));
    // only the x=1 pair touches the +X face
    assert_eq!(collect(0, 1), coords(&[(1, 0, 0), (1, 1, 0)]));
    // only the y=0 pair touches the -Y face
    assert_eq!(collect(1, -1), coords(&[(0, 0, 0), (1, 0, 0)]));
}

#[test]
fn face_iteration_checks_level_skipping_children_against_the_face() {
    let mut tree = ChunkOctree::new();
    tree.insert(ChunkCoord::new(0, 0, 0));
    tree.insert(ChunkCoord::new(2, 0, 0));
    let root = tree.root().unwrap();

    // the cell spans x in [0,4); chunk 2 does not reach the +X face
    let mut found = Vec::new();
    tree.iterate_face_nodes(root, 0, 1, false, &mut |id| {
        found.push(tree.leaf_coord(id).unwrap());
    });
    assert!(found.is_empty());

    // chunk 0 does reach the -X face
    let mut found = Vec::new();
    tree.iterate_face_nodes(root, 0, -1, false, &mut |id| {
        found.push(tree.leaf_coord(id).unwrap());
    });
    assert_eq!(found, vec![ChunkCoord::new(0, 0, 0)]);
}

#[test]
fn visibility_stamps_gate_box_queries() {
    let mut tree = ChunkOctree::new();
    tree.insert(ChunkCoord::new(0, 0, 0));
    tree.insert(ChunkCoord::new(6, 0, 0));
    tree.insert(ChunkCoord::new(0, 6, 0));

    tree.mark_visible(ChunkCoord::new(6, 0, 0), 7);
    // the stamped chunk's cell is visible in frame 7
    assert!(tree.is_box_visible(7, ChunkCoord::new(5, 0, 0), ChunkCoord::new(8, 0, 0)));
    // a box that misses every stamped chunk reports invisible
    assert!(!tree.is_box_visible(7, ChunkCoord::new(0, 5, 0), ChunkCoord::new(0, 8, 0)));
    // other frames see nothing
    assert!(!tree.is_box_visible(8, ChunkCoord::new(5, 0, 0), ChunkCoord::new(8, 0, 0)));
}

use lucent_geom::ChunkCoord;
use lucent_trigger::ChunkOctree;
use proptest::prelude::*;

fn arb_coords() -> impl Strategy<Value = Vec<ChunkCoord>> {
    // a tight range forces heavy prefix sharing and branch synthesis
    prop::collection::btree_set((-9i32..9, -3i32..3, -9i32..9), 1..40).prop_map(|set| {
        set.into_iter()
            .map(|(x, y, z)| ChunkCoord::new(x, y, z))
            .collect()
    })
}

proptest! {
    // Inserting distinct chunks and removing them in an arbitrary order
    // keeps every structural invariant and ends with an empty tree.
    #[test]
    fn insert_remove_churn_keeps_invariants(
        coords in arb_coords(),
        removal_seed in any::<u64>(),
    ) {
        let mut tree = ChunkOctree::new();
        for &c in &coords {
            tree.insert(c);
            tree.validate();
        }
        prop_assert_eq!(tree.len(), coords.len());
        for &c in &coords {
            prop_assert!(tree.contains(c));
        }

        // cheap deterministic shuffle of the removal order
        let mut order: Vec<usize> = (0..coords.len()).collect();
        let mut state = removal_seed | 1;
        for i in (1..order.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            order.swap(i, (state >> 33) as usize % (i + 1));
        }

        for &i in &order {
            tree.remove(coords[i]);
            // no inner node, the root included, may keep a single child
            tree.validate();
            prop_assert!(!tree.contains(coords[i]));
        }
        prop_assert!(tree.is_empty());
    }

    // Toggling leaf skippability in any pattern keeps the aggregated counts
    // consistent, and an all-skippable tree reports a skippable root.
    #[test]
    fn skippable_counts_stay_consistent(
        coords in arb_coords(),
        toggles in prop::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 0..60),
    ) {
        let mut tree = ChunkOctree::new();
        for &c in &coords {
            tree.insert(c);
        }
        for (index, value) in toggles {
            let c = coords[index.index(coords.len())];
            tree.set_skippable(c, value);
            tree.validate();
        }
        for &c in &coords {
            tree.set_skippable(c, true);
        }
        tree.validate();
        prop_assert!(tree.is_skippable(tree.root().unwrap()));
    }

    // Lookup agrees with membership for coordinates that were never added.
    #[test]
    fn absent_coordinates_are_not_found(coords in arb_coords()) {
        let mut tree = ChunkOctree::new();
        for &c in &coords {
            tree.insert(c);
        }
        for probe_x in [-20i32, 20] {
            let probe = ChunkCoord::new(probe_x, 0, 0);
            prop_assert!(!tree.contains(probe));
        }
    }
}

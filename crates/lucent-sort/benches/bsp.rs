use criterion::{Criterion, black_box, criterion_group, criterion_main};

use lucent_geom::{ChunkCoord, Vec3};
use lucent_sort::{Facing, Quad, build_bsp};

fn layered_panes(count: usize) -> Vec<Quad> {
    (0..count)
        .map(|i| {
            let facing = if i % 2 == 0 { Facing::PosY } else { Facing::NegY };
            let plane = i as f32 * 16.0 / count as f32;
            let mut extents = [16.0, 16.0, 16.0, 0.0, 0.0, 0.0];
            extents[1] = plane;
            extents[4] = plane;
            Quad::from_aligned(facing, extents)
        })
        .collect()
}

fn bench_bsp_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("bsp_build");
    for count in [16usize, 64, 256] {
        let quads = layered_panes(count);
        group.bench_function(format!("layered_{count}"), |b| {
            b.iter(|| {
                let result = build_bsp(ChunkCoord::new(0, 0, 0), &quads, None, false);
                black_box(result.unwrap());
            })
        });
    }
    group.finish();
}

fn bench_bsp_rebuild_with_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("bsp_rebuild_reuse");
    for count in [64usize, 256] {
        let quads = layered_panes(count);
        let coord = ChunkCoord::new(0, 0, 0);
        let first = build_bsp(coord, &quads, None, false).unwrap();
        group.bench_function(format!("unchanged_{count}"), |b| {
            b.iter(|| {
                let result = build_bsp(coord, &quads, Some(&first.tree), true);
                black_box(result.unwrap());
            })
        });
    }
    group.finish();
}

fn bench_collect_sorted(c: &mut Criterion) {
    let mut group = c.benchmark_group("bsp_collect_sorted");
    let quads = layered_panes(256);
    let result = build_bsp(ChunkCoord::new(0, 0, 0), &quads, None, false).unwrap();
    let mut out = Vec::with_capacity(quads.len());
    group.bench_function("layered_256", |b| {
        b.iter(|| {
            result
                .tree
                .collect_sorted_quads(Vec3::new(8.0, 100.0, 8.0), &mut out);
            black_box(&out);
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_bsp_build,
    bench_bsp_rebuild_with_reuse,
    bench_collect_sorted
);
criterion_main!(benches);

//! Incremental translucency sorting for chunked voxel worlds.
//!
//! The pipeline: a mesh builder feeds each chunk's translucent quads into a
//! [`GeometryCollector`] (usually via a [`Runtime`] worker job), which picks
//! the cheapest provably correct sort strategy and builds the chunk's
//! [`TranslucentData`]. Dynamic strategies register their face planes with
//! [`SortTriggering`]; on every camera movement the renderer asks it which
//! chunks may now composite incorrectly and re-sorts exactly those.
#![forbid(unsafe_code)]

pub use lucent_geom::{Aabb, CHUNK_SIZE, ChunkCoord, Dist, Vec3};
pub use lucent_runtime::{QuadInput, Runtime, SortJob, SortJobOut};
pub use lucent_sort::{
    AccumulationGroup, BspBuildError, BspTree, DataOutcome, Facing, GeometryCollector,
    GeometryPlanes, MeshRanges, Quad, QuantizedNormal, SortMode, SortSettings, SortType,
    TranslucentData, VertexRange, build_bsp,
};
pub use lucent_trigger::{CameraMovement, ChunkOctree, NormalList, SortTriggering};

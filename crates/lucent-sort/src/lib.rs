//! Translucent geometry classification and sorting for chunked voxel worlds.
//!
//! A [`GeometryCollector`] consumes a chunk's translucent quads during
//! meshing, picks the cheapest sort strategy that is still guaranteed
//! correct, and produces a [`TranslucentData`] value. Dynamic strategies
//! carry either a BSP tree or the quad list itself and re-sort in place when
//! the trigger system reports that the camera crossed one of their planes.
#![forbid(unsafe_code)]

mod bsp;
mod collector;
mod data;
mod group;
mod quad;
mod settings;
mod topo;

pub use bsp::{BspBuildError, BspResult, BspTree, NODE_REUSE_MIN_GENERATION, build_bsp};
pub use collector::{DataOutcome, GeometryCollector};
pub use data::{
    AnyOrderData, BspDynamicData, DIRECT_TRIGGER_MAX_QUADS, MAX_TOPO_SORT_FAILURES, MeshRanges,
    SortType, StaticSortData, TopoDynamicData, TranslucentData, TriggerChanges, VertexRange,
    normal_relative_order,
};
pub use group::{AccumulationGroup, GeometryPlanes};
pub use quad::{
    DIRECTIONS, FACING_COUNT, Facing, OPPOSING_X, OPPOSING_Y, OPPOSING_Z, QUANTIZATION_FACTOR,
    QUANTIZE_EPSILON, Quad, QuantizedNormal,
};
pub use settings::{SortMode, SortSettings};
pub use topo::{distance_sort, topo_sort};

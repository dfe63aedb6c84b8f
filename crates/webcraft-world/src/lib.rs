//! World management: block registry, chunk storage and lifecycle, terrain
//! generation, meshing, persistence and chunk sync.

pub mod block_registry;
pub mod chunk;
pub mod chunk_manager;
pub mod coords;
pub mod error;
pub mod extra_data;
pub mod flat_generator;
pub mod generator;
pub mod light;
pub mod mesh;
pub mod modified;
pub mod render;
pub mod storage;
pub mod sync;
pub mod typed_blocks;
pub mod worker;

pub use block_registry::{BlockRegistry, BlockType};
pub use chunk::{Chunk, ChunkState, SetBlockOutcome, SetBlockRequest};
pub use chunk_manager::ChunkManager;
pub use coords::{ChunkSize, LocalPos};
pub use error::WorldError;
pub use typed_blocks::{BlockInstance, TypedBlocks};

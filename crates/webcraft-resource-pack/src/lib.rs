//! Webcraft resource pack parser.
//!
//! Parses resource pack JSON files (`conf.json`, `blocks.json`) and provides
//! a loader that scans a packs directory.

pub mod block;
pub mod loader;
pub mod manifest;

pub use block::{BlockDefinition, LightPower, MaterialRef};
pub use loader::{load_all_packs, load_resource_pack, LoadedResourcePack};
pub use manifest::PackConfig;

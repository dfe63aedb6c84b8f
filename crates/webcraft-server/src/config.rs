use serde::Deserialize;
use std::path::Path;

use webcraft_world::coords::ChunkSize;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub world: WorldSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
    #[serde(default)]
    pub packs: PacksSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    pub address: String,
    pub port: u16,
    pub max_players: u32,
}

/// How a client receives the persisted state of a modified chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkTransfer {
    /// Ordered edit list, replayed on top of client-side generation.
    #[default]
    ModifyList,
    /// Full compressed storage.
    Snapshot,
}

#[derive(Debug, Deserialize)]
pub struct WorldSection {
    pub guid: String,
    pub name: String,
    pub generator: String,
    #[serde(default)]
    pub seed: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: [i32; 3],
    /// Lowest chunk y ever sent to clients.
    #[serde(default)]
    pub min_chunk_y: i32,
    #[serde(default)]
    pub chunk_transfer: ChunkTransfer,
    #[serde(default = "default_database")]
    pub database: String,
    /// Auto-save interval in seconds. 0 = disabled. Default: 300 (5 minutes).
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval: u64,
}

impl WorldSection {
    pub fn chunk_size(&self) -> Result<ChunkSize, String> {
        let [x, y, z] = self.chunk_size;
        if x <= 0 || y <= 0 || z <= 0 {
            return Err(format!("invalid chunk_size {:?}", self.chunk_size));
        }
        Ok(ChunkSize::new(x, y, z))
    }
}

fn default_chunk_size() -> [i32; 3] {
    let s = ChunkSize::default();
    [s.x, s.y, s.z]
}

fn default_database() -> String {
    "world/db".into()
}

fn default_auto_save_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize)]
pub struct PacksSection {
    #[serde(default = "default_packs_directory")]
    pub directory: String,
}

fn default_packs_directory() -> String {
    "resource_packs".into()
}

impl Default for PacksSection {
    fn default() -> Self {
        Self {
            directory: default_packs_directory(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PermissionsSection {
    #[serde(default = "default_admins_file")]
    pub admins_file: String,
}

fn default_admins_file() -> String {
    "admins.json".into()
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            admins_file: default_admins_file(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    pub level: String,
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

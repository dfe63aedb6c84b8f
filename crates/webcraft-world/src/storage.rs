//! World persistence: world records, per-chunk modify lists, the modified
//! chunk index and player state.
//!
//! Values are JSON documents under string keys.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use rusty_leveldb::DB;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use webcraft_proto::packets::ModifyEntry;
use webcraft_proto::types::{ChunkAddr, Vec3};

use crate::error::WorldError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub guid: String,
    pub name: String,
    pub seed: String,
    pub generator: String,
    #[serde(default)]
    pub spawn: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateRecord {
    pub pos: Vec3,
    #[serde(default)]
    pub rotate: Vec3,
    pub chunk_render_dist: i32,
}

/// Record store collaborator. Writes are durable after [`WorldStore::flush`].
pub trait WorldStore: Send {
    fn get_world(&mut self, guid: &str) -> Result<Option<WorldInfo>, WorldError>;
    fn save_world(&mut self, info: &WorldInfo) -> Result<(), WorldError>;
    /// Every chunk with at least one stored edit.
    fn chunk_became_modified(&mut self) -> Result<Vec<ChunkAddr>, WorldError>;
    /// Record one authoritative edit. A later edit of the same cell replaces
    /// the earlier one but keeps its place in the list.
    fn block_set(
        &mut self,
        player_id: u64,
        addr: ChunkAddr,
        entry: &ModifyEntry,
    ) -> Result<(), WorldError>;
    fn load_modify_list(&mut self, addr: ChunkAddr) -> Result<Vec<ModifyEntry>, WorldError>;
    fn save_player_state(&mut self, user: &str, state: &PlayerStateRecord)
        -> Result<(), WorldError>;
    fn load_player_state(&mut self, user: &str) -> Result<Option<PlayerStateRecord>, WorldError>;
    fn save_player_inventory(&mut self, user: &str, inventory: &Value) -> Result<(), WorldError>;
    fn load_player_inventory(&mut self, user: &str) -> Result<Option<Value>, WorldError>;
    fn flush(&mut self) -> Result<(), WorldError>;
}

fn upsert(list: &mut Vec<ModifyEntry>, entry: &ModifyEntry) {
    match list.iter_mut().find(|e| e.pos == entry.pos) {
        Some(existing) => existing.item = entry.item.clone(),
        None => list.push(entry.clone()),
    }
}

// ─── Keys ───────────────────────────────────────────────────────────────────

const KEY_MODIFIED_CHUNKS: &str = "modified_chunks";

fn world_key(guid: &str) -> String {
    format!("world:{guid}")
}

fn chunk_key(addr: ChunkAddr) -> String {
    format!("chunk:{}:{}:{}", addr.x, addr.y, addr.z)
}

fn player_state_key(user: &str) -> String {
    format!("player:{user}:state")
}

fn player_inventory_key(user: &str) -> String {
    format!("player:{user}:inventory")
}

// ─── LevelDB store ──────────────────────────────────────────────────────────

pub struct LevelDbStore {
    db: DB,
    /// Cached modified index, loaded on first use.
    modified: Option<BTreeSet<ChunkAddr>>,
}

impl LevelDbStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, WorldError> {
        let opts = rusty_leveldb::Options {
            create_if_missing: true,
            ..rusty_leveldb::Options::default()
        };
        let db = DB::open(path, opts)
            .map_err(|e| WorldError::Storage(format!("Failed to open LevelDB: {e}")))?;
        Ok(Self { db, modified: None })
    }

    fn get_json<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, WorldError> {
        match self.db.get(key.as_bytes()) {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), WorldError> {
        let data = serde_json::to_vec(value)?;
        self.db
            .put(key.as_bytes(), &data)
            .map_err(|e| WorldError::Storage(format!("put {key}: {e}")))
    }

    fn modified_index(&mut self) -> Result<&mut BTreeSet<ChunkAddr>, WorldError> {
        if self.modified.is_none() {
            let list: Vec<ChunkAddr> = self.get_json(KEY_MODIFIED_CHUNKS)?.unwrap_or_default();
            self.modified = Some(list.into_iter().collect());
        }
        Ok(self.modified.get_or_insert_with(BTreeSet::new))
    }
}

impl WorldStore for LevelDbStore {
    fn get_world(&mut self, guid: &str) -> Result<Option<WorldInfo>, WorldError> {
        self.get_json(&world_key(guid))
    }

    fn save_world(&mut self, info: &WorldInfo) -> Result<(), WorldError> {
        self.put_json(&world_key(&info.guid), info)
    }

    fn chunk_became_modified(&mut self) -> Result<Vec<ChunkAddr>, WorldError> {
        Ok(self.modified_index()?.iter().copied().collect())
    }

    fn block_set(
        &mut self,
        player_id: u64,
        addr: ChunkAddr,
        entry: &ModifyEntry,
    ) -> Result<(), WorldError> {
        let key = chunk_key(addr);
        let mut list: Vec<ModifyEntry> = self.get_json(&key)?.unwrap_or_default();
        upsert(&mut list, entry);
        self.put_json(&key, &list)?;
        if self.modified_index()?.insert(addr) {
            let index: Vec<ChunkAddr> = self.modified_index()?.iter().copied().collect();
            self.put_json(KEY_MODIFIED_CHUNKS, &index)?;
        }
        debug!("player {player_id} edit at {} stored in {addr}", entry.pos);
        Ok(())
    }

    fn load_modify_list(&mut self, addr: ChunkAddr) -> Result<Vec<ModifyEntry>, WorldError> {
        Ok(self.get_json(&chunk_key(addr))?.unwrap_or_default())
    }

    fn save_player_state(
        &mut self,
        user: &str,
        state: &PlayerStateRecord,
    ) -> Result<(), WorldError> {
        self.put_json(&player_state_key(user), state)
    }

    fn load_player_state(&mut self, user: &str) -> Result<Option<PlayerStateRecord>, WorldError> {
        match self.get_json(&player_state_key(user)) {
            Ok(state) => Ok(state),
            Err(WorldError::Json(e)) => {
                warn!("Failed to parse player state for {user}: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn save_player_inventory(&mut self, user: &str, inventory: &Value) -> Result<(), WorldError> {
        self.put_json(&player_inventory_key(user), inventory)
    }

    fn load_player_inventory(&mut self, user: &str) -> Result<Option<Value>, WorldError> {
        self.get_json(&player_inventory_key(user))
    }

    fn flush(&mut self) -> Result<(), WorldError> {
        self.db
            .flush()
            .map_err(|e| WorldError::Storage(format!("flush: {e}")))
    }
}

// ─── In-memory store ────────────────────────────────────────────────────────

/// Store without persistence, for tests and throwaway worlds.
#[derive(Debug, Default)]
pub struct MemoryStore {
    worlds: HashMap<String, WorldInfo>,
    chunks: HashMap<ChunkAddr, Vec<ModifyEntry>>,
    modified: BTreeSet<ChunkAddr>,
    players: HashMap<String, PlayerStateRecord>,
    inventories: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorldStore for MemoryStore {
    fn get_world(&mut self, guid: &str) -> Result<Option<WorldInfo>, WorldError> {
        Ok(self.worlds.get(guid).cloned())
    }

    fn save_world(&mut self, info: &WorldInfo) -> Result<(), WorldError> {
        self.worlds.insert(info.guid.clone(), info.clone());
        Ok(())
    }

    fn chunk_became_modified(&mut self) -> Result<Vec<ChunkAddr>, WorldError> {
        Ok(self.modified.iter().copied().collect())
    }

    fn block_set(
        &mut self,
        _player_id: u64,
        addr: ChunkAddr,
        entry: &ModifyEntry,
    ) -> Result<(), WorldError> {
        upsert(self.chunks.entry(addr).or_default(), entry);
        self.modified.insert(addr);
        Ok(())
    }

    fn load_modify_list(&mut self, addr: ChunkAddr) -> Result<Vec<ModifyEntry>, WorldError> {
        Ok(self.chunks.get(&addr).cloned().unwrap_or_default())
    }

    fn save_player_state(
        &mut self,
        user: &str,
        state: &PlayerStateRecord,
    ) -> Result<(), WorldError> {
        self.players.insert(user.to_string(), state.clone());
        Ok(())
    }

    fn load_player_state(&mut self, user: &str) -> Result<Option<PlayerStateRecord>, WorldError> {
        Ok(self.players.get(user).cloned())
    }

    fn save_player_inventory(&mut self, user: &str, inventory: &Value) -> Result<(), WorldError> {
        self.inventories.insert(user.to_string(), inventory.clone());
        Ok(())
    }

    fn load_player_inventory(&mut self, user: &str) -> Result<Option<Value>, WorldError> {
        Ok(self.inventories.get(user).cloned())
    }

    fn flush(&mut self) -> Result<(), WorldError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use webcraft_proto::packets::BlockItem;
    use webcraft_proto::types::BlockPos;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("webcraft_store_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn entry(x: i32, id: u32) -> ModifyEntry {
        ModifyEntry {
            pos: BlockPos::new(x, 10, 3),
            item: BlockItem::new(id),
        }
    }

    fn exercise(store: &mut dyn WorldStore) {
        let addr = ChunkAddr::new(1, 0, 0);
        store.block_set(1, addr, &entry(18, 5)).unwrap();
        store.block_set(1, addr, &entry(19, 6)).unwrap();
        store.block_set(2, addr, &entry(18, 7)).unwrap();
        let list = store.load_modify_list(addr).unwrap();
        assert_eq!(list, vec![entry(18, 7), entry(19, 6)]);
        assert_eq!(store.chunk_became_modified().unwrap(), vec![addr]);
        assert!(store.load_modify_list(ChunkAddr::new(0, 0, 0)).unwrap().is_empty());

        let state = PlayerStateRecord {
            pos: Vec3::new(1.0, 2.0, 3.0),
            rotate: Vec3::ZERO,
            chunk_render_dist: 4,
        };
        store.save_player_state("alex", &state).unwrap();
        assert_eq!(store.load_player_state("alex").unwrap(), Some(state));
        assert_eq!(store.load_player_state("nobody").unwrap(), None);

        let inventory = serde_json::json!({"current": {"index": 2}, "items": []});
        store.save_player_inventory("alex", &inventory).unwrap();
        assert_eq!(store.load_player_inventory("alex").unwrap(), Some(inventory));
        assert_eq!(store.load_player_inventory("nobody").unwrap(), None);
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn leveldb_store_contract() {
        let dir = temp_dir();
        let mut store = LevelDbStore::open(&dir.join("db")).unwrap();
        exercise(&mut store);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn leveldb_survives_reopen() {
        let dir = temp_dir();
        let path = dir.join("db");
        let info = WorldInfo {
            guid: "w1".into(),
            name: "Test".into(),
            seed: "42".into(),
            generator: "flat".into(),
            spawn: Vec3::new(0.0, 4.0, 0.0),
        };
        {
            let mut store = LevelDbStore::open(&path).unwrap();
            store.save_world(&info).unwrap();
            store
                .block_set(1, ChunkAddr::new(-1, 0, 2), &entry(-5, 5))
                .unwrap();
            store.flush().unwrap();
        }
        let mut store = LevelDbStore::open(&path).unwrap();
        assert_eq!(store.get_world("w1").unwrap(), Some(info));
        assert_eq!(
            store.chunk_became_modified().unwrap(),
            vec![ChunkAddr::new(-1, 0, 2)]
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}

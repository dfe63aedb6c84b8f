//! In-memory mirror of the set of chunks that carry player edits.

use std::collections::HashSet;

use webcraft_proto::types::ChunkAddr;

#[derive(Debug, Default, Clone)]
pub struct ModifiedChunkSet {
    addrs: HashSet<ChunkAddr>,
}

impl ModifiedChunkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with what the store holds.
    pub fn load(&mut self, addrs: impl IntoIterator<Item = ChunkAddr>) {
        self.addrs.clear();
        self.addrs.extend(addrs);
    }

    /// Returns `true` if the chunk was not marked before.
    pub fn mark_modified(&mut self, addr: ChunkAddr) -> bool {
        self.addrs.insert(addr)
    }

    pub fn has_modifications(&self, addr: ChunkAddr) -> bool {
        self.addrs.contains(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkAddr> {
        self.addrs.iter()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

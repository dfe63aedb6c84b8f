//! Rendering backend contract.
//!
//! Chunks hand finished vertex groups to a backend and get opaque handles
//! back; the backend never sees chunk storage.

use std::collections::HashSet;

use tracing::trace;

use webcraft_proto::types::ChunkAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

pub trait RenderBackend: Send {
    /// Upload one vertex group of a chunk.
    fn create_buffer(&mut self, addr: ChunkAddr, material_key: &str, vertices: &[f32])
        -> BufferHandle;
    fn destroy_buffer(&mut self, handle: BufferHandle);
    /// Take a light texture from the pool.
    fn alloc_light_texture(&mut self, addr: ChunkAddr) -> TextureHandle;
    /// Return a light texture to the pool.
    fn release_light_texture(&mut self, handle: TextureHandle);

    fn live_buffers(&self) -> usize;
    fn live_textures(&self) -> usize;
}

/// Backend without a GPU. Tracks handle lifetimes so leaks show up in tests
/// and in headless clients.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    buffers: HashSet<u64>,
    textures: HashSet<u64>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_buffer(
        &mut self,
        addr: ChunkAddr,
        material_key: &str,
        vertices: &[f32],
    ) -> BufferHandle {
        let id = self.next();
        trace!("buffer {id} for {addr} {material_key}: {} floats", vertices.len());
        self.buffers.insert(id);
        BufferHandle(id)
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        self.buffers.remove(&handle.0);
    }

    fn alloc_light_texture(&mut self, _addr: ChunkAddr) -> TextureHandle {
        let id = self.next();
        self.textures.insert(id);
        TextureHandle(id)
    }

    fn release_light_texture(&mut self, handle: TextureHandle) {
        self.textures.remove(&handle.0);
    }

    fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    fn live_textures(&self) -> usize {
        self.textures.len()
    }
}

//! Connected player state as the world sees it.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use webcraft_proto::codec::{GamePacket, Packet};
use webcraft_proto::types::{ChunkAddr, Vec3};
use webcraft_world::storage::PlayerStateRecord;

/// Default render distance in chunks.
pub const DEFAULT_RENDER_DIST: i32 = 4;
/// Upper bound accepted from clients.
pub const MAX_RENDER_DIST: i32 = 16;

/// Outbound channel to a connection's writer task. One item is one batch.
pub type PacketSender = mpsc::UnboundedSender<Vec<Packet>>;

pub struct ServerPlayer {
    pub id: u64,
    pub username: String,
    pub pos: Vec3,
    pub rotate: Vec3,
    pub render_dist: i32,
    /// Chunk the visibility set was last computed for.
    pub chunk_addr: Option<ChunkAddr>,
    /// Chunks announced to this client and not yet removed.
    pub nearby: HashSet<ChunkAddr>,
    /// Recompute visibility on the next tick even if the chunk is unchanged.
    pub force_visibility: bool,
    /// Set by position updates; visibility is only recomputed when set.
    pub position_changed: bool,
    tx: PacketSender,
}

impl ServerPlayer {
    pub fn new(id: u64, username: String, tx: PacketSender) -> Self {
        Self {
            id,
            username,
            pos: Vec3::ZERO,
            rotate: Vec3::ZERO,
            render_dist: DEFAULT_RENDER_DIST,
            chunk_addr: None,
            nearby: HashSet::new(),
            force_visibility: true,
            position_changed: false,
            tx,
        }
    }

    /// Restore persisted state.
    pub fn apply_record(&mut self, record: &PlayerStateRecord) {
        self.pos = record.pos;
        self.rotate = record.rotate;
        self.set_render_dist(record.chunk_render_dist);
    }

    pub fn record(&self) -> PlayerStateRecord {
        PlayerStateRecord {
            pos: self.pos,
            rotate: self.rotate,
            chunk_render_dist: self.render_dist,
        }
    }

    /// Clamp and store a render distance. Returns `true` if it changed.
    pub fn set_render_dist(&mut self, dist: i32) -> bool {
        let dist = dist.clamp(0, MAX_RENDER_DIST);
        if dist == self.render_dist {
            return false;
        }
        self.render_dist = dist;
        self.force_visibility = true;
        true
    }

    /// Queue a batch for the client. A closed connection drops it.
    pub fn send(&self, packets: Vec<Packet>) {
        if packets.is_empty() {
            return;
        }
        if self.tx.send(packets).is_err() {
            debug!("Connection of player {} closed, batch dropped", self.id);
        }
    }

    pub fn send_packet<P: GamePacket>(&self, packet: &P) {
        match Packet::new(packet) {
            Ok(p) => self.send(vec![p]),
            Err(e) => warn!("Failed to encode packet {} for {}: {e}", P::ID, self.username),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webcraft_proto::packets::Pong;

    #[test]
    fn render_dist_is_clamped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut p = ServerPlayer::new(1, "Steve".into(), tx);
        p.force_visibility = false;
        assert!(p.set_render_dist(100));
        assert_eq!(p.render_dist, MAX_RENDER_DIST);
        assert!(p.force_visibility);
        assert!(!p.set_render_dist(MAX_RENDER_DIST));
        p.set_render_dist(-3);
        assert_eq!(p.render_dist, 0);
    }

    #[test]
    fn record_roundtrip() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut p = ServerPlayer::new(1, "Steve".into(), tx);
        let rec = PlayerStateRecord {
            pos: Vec3::new(1.0, 2.0, 3.0),
            rotate: Vec3::new(0.0, 0.5, 0.0),
            chunk_render_dist: 6,
        };
        p.apply_record(&rec);
        assert_eq!(p.record(), rec);
    }

    #[test]
    fn send_after_close_is_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let p = ServerPlayer::new(1, "Steve".into(), tx);
        p.send_packet(&Pong);
        assert_eq!(rx.try_recv().unwrap().len(), 1);
        drop(rx);
        p.send_packet(&Pong);
    }
}

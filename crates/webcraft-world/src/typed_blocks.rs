//! Dense per-chunk block storage.
//!
//! One flat array per channel (id, power, rotate, extra pointer) sized to the
//! chunk volume. Only cells that carry `extra_data` or an `entity_id` use a
//! slot in the side table, so steady-state writes of plain blocks never
//! allocate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use webcraft_proto::compression;
use webcraft_proto::packets::BlockItem;
use webcraft_proto::types::Vec3;

use crate::block_registry::AIR_ID;
use crate::coords::{ChunkSize, LocalPos};
use crate::error::WorldError;
use crate::extra_data::{ExtraData, ExtraDataSchema};

/// Default power of a placed block.
pub const POWER_DEFAULT: u32 = 100;

/// Value snapshot of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInstance {
    pub id: u32,
    pub power: u32,
    pub rotate: Vec3,
    pub extra_data: Option<ExtraData>,
    pub entity_id: Option<String>,
}

impl BlockInstance {
    pub fn air() -> Self {
        Self {
            id: AIR_ID,
            power: 0,
            rotate: Vec3::ZERO,
            extra_data: None,
            entity_id: None,
        }
    }

    /// Plain block with default power and no rotation.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            power: POWER_DEFAULT,
            ..Self::air()
        }
    }

    /// Cell value from a wire item. Missing power defaults to
    /// [`POWER_DEFAULT`], missing rotate to zero. A non-air item with zero
    /// power places nothing and yields `None`.
    pub fn from_item(item: &BlockItem, schema: ExtraDataSchema) -> Option<Self> {
        if item.id == AIR_ID {
            return Some(Self::air());
        }
        let power = item.power.unwrap_or(POWER_DEFAULT);
        if power == 0 {
            return None;
        }
        Some(Self {
            id: item.id,
            power,
            rotate: item.rotate.unwrap_or(Vec3::ZERO),
            extra_data: item
                .extra_data
                .as_ref()
                .and_then(|v| ExtraData::decode(schema, v)),
            entity_id: item.entity_id.clone(),
        })
    }

    /// Wire item for this cell. Default power and zero rotate are omitted.
    pub fn to_item(&self) -> BlockItem {
        if self.id == AIR_ID {
            return BlockItem::air();
        }
        BlockItem {
            id: self.id,
            power: (self.power != POWER_DEFAULT).then_some(self.power),
            rotate: (self.rotate != Vec3::ZERO).then_some(self.rotate),
            extra_data: self.extra_data.as_ref().map(ExtraData::to_value),
            entity_id: self.entity_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CellExtras {
    extra_data: Option<ExtraData>,
    entity_id: Option<String>,
}

/// Borrowed accessor over one cell. No allocation.
#[derive(Clone, Copy)]
pub struct BlockRef<'a> {
    blocks: &'a TypedBlocks,
    index: usize,
}

impl<'a> BlockRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> u32 {
        self.blocks.id[self.index]
    }

    pub fn power(&self) -> u32 {
        self.blocks.power[self.index]
    }

    pub fn rotate(&self) -> Vec3 {
        let r = &self.blocks.rotate[self.index * 3..self.index * 3 + 3];
        Vec3::new(r[0], r[1], r[2])
    }

    pub fn extra_data(&self) -> Option<&'a ExtraData> {
        self.extras()?.extra_data.as_ref()
    }

    pub fn entity_id(&self) -> Option<&'a str> {
        self.extras()?.entity_id.as_deref()
    }

    fn extras(&self) -> Option<&'a CellExtras> {
        self.blocks.extras_at(self.index)
    }

    pub fn to_instance(&self) -> BlockInstance {
        BlockInstance {
            id: self.id(),
            power: self.power(),
            rotate: self.rotate(),
            extra_data: self.extra_data().cloned(),
            entity_id: self.entity_id().map(str::to_string),
        }
    }
}

/// Block storage of one chunk.
#[derive(Debug, Clone)]
pub struct TypedBlocks {
    size: ChunkSize,
    id: Vec<u32>,
    power: Vec<u32>,
    rotate: Vec<f32>,
    /// 0 = no extras, otherwise slot index + 1.
    extra_ptr: Vec<u32>,
    extras: Vec<Option<CellExtras>>,
    free_slots: Vec<u32>,
}

impl TypedBlocks {
    /// All-air storage.
    pub fn new(size: ChunkSize) -> Self {
        let volume = size.volume();
        Self {
            size,
            id: vec![AIR_ID; volume],
            power: vec![0; volume],
            rotate: vec![0.0; volume * 3],
            extra_ptr: vec![0; volume],
            extras: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    pub fn size(&self) -> ChunkSize {
        self.size
    }

    pub fn volume(&self) -> usize {
        self.id.len()
    }

    /// Accessor for hot loops.
    pub fn get(&self, l: LocalPos) -> BlockRef<'_> {
        self.get_index(self.size.flatten(l))
    }

    pub fn get_index(&self, index: usize) -> BlockRef<'_> {
        debug_assert!(index < self.volume());
        BlockRef {
            blocks: self,
            index,
        }
    }

    /// Owned copy of a cell.
    pub fn get_instance(&self, l: LocalPos) -> BlockInstance {
        self.get(l).to_instance()
    }

    pub fn id_at(&self, l: LocalPos) -> u32 {
        self.id[self.size.flatten(l)]
    }

    /// Overwrite every channel of a cell.
    pub fn set(&mut self, l: LocalPos, block: BlockInstance) {
        let index = self.size.flatten(l);
        self.id[index] = block.id;
        self.power[index] = block.power;
        self.write_rotate(index, block.rotate);
        self.write_extras(index, block.extra_data, block.entity_id);
    }

    /// Write used by generators: id, optional rotate and extra data, default
    /// power.
    pub fn set_indirect(
        &mut self,
        l: LocalPos,
        id: u32,
        rotate: Option<Vec3>,
        extra_data: Option<ExtraData>,
    ) {
        let index = self.size.flatten(l);
        self.id[index] = id;
        self.power[index] = if id == AIR_ID { 0 } else { POWER_DEFAULT };
        self.write_rotate(index, rotate.unwrap_or(Vec3::ZERO));
        self.write_extras(index, extra_data, None);
    }

    /// Reset a cell to air.
    pub fn delete(&mut self, l: LocalPos) {
        let index = self.size.flatten(l);
        self.id[index] = AIR_ID;
        self.power[index] = 0;
        self.write_rotate(index, Vec3::ZERO);
        self.write_extras(index, None, None);
    }

    /// Number of non-air cells.
    pub fn non_air_count(&self) -> usize {
        self.id.iter().filter(|&&id| id != AIR_ID).count()
    }

    fn write_rotate(&mut self, index: usize, r: Vec3) {
        let slot = &mut self.rotate[index * 3..index * 3 + 3];
        slot[0] = r.x;
        slot[1] = r.y;
        slot[2] = r.z;
    }

    fn extras_at(&self, index: usize) -> Option<&CellExtras> {
        match self.extra_ptr[index] {
            0 => None,
            ptr => self.extras.get(ptr as usize - 1)?.as_ref(),
        }
    }

    fn write_extras(
        &mut self,
        index: usize,
        extra_data: Option<ExtraData>,
        entity_id: Option<String>,
    ) {
        let ptr = self.extra_ptr[index];
        if extra_data.is_none() && entity_id.is_none() {
            if ptr != 0 {
                self.extras[ptr as usize - 1] = None;
                self.free_slots.push(ptr - 1);
                self.extra_ptr[index] = 0;
            }
            return;
        }
        let value = CellExtras {
            extra_data,
            entity_id,
        };
        if ptr != 0 {
            self.extras[ptr as usize - 1] = Some(value);
            return;
        }
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.extras[slot as usize] = Some(value);
                slot
            }
            None => {
                self.extras.push(Some(value));
                (self.extras.len() - 1) as u32
            }
        };
        self.extra_ptr[index] = slot + 1;
    }

    // ─── Snapshot ───────────────────────────────────────────────────────────

    /// Serializable copy of every channel.
    pub fn snapshot(&self) -> TypedBlocksSnapshot {
        let extras = (0..self.volume())
            .filter_map(|index| {
                let e = self.extras_at(index)?;
                Some(SnapshotExtras {
                    index: index as u32,
                    kind: e.extra_data.as_ref().map(ExtraData::kind),
                    extra_data: e.extra_data.as_ref().map(ExtraData::to_value),
                    entity_id: e.entity_id.clone(),
                })
            })
            .collect();
        TypedBlocksSnapshot {
            size: self.size,
            id: self.id.clone(),
            power: self.power.clone(),
            rotate: self.rotate.clone(),
            extras,
        }
    }

    /// Replace the whole storage with a snapshot of the same size.
    pub fn restore_state(&mut self, snapshot: TypedBlocksSnapshot) -> Result<(), WorldError> {
        let expected = self.volume();
        if snapshot.size != self.size
            || snapshot.id.len() != expected
            || snapshot.power.len() != expected
            || snapshot.rotate.len() != expected * 3
        {
            return Err(WorldError::SnapshotSizeMismatch {
                expected,
                got: snapshot.id.len(),
            });
        }
        if let Some(bad) = snapshot.extras.iter().find(|e| e.index as usize >= expected) {
            return Err(WorldError::SnapshotSizeMismatch {
                expected,
                got: bad.index as usize + 1,
            });
        }
        self.id = snapshot.id;
        self.power = snapshot.power;
        self.rotate = snapshot.rotate;
        self.extra_ptr.iter_mut().for_each(|p| *p = 0);
        self.extras.clear();
        self.free_slots.clear();
        for e in snapshot.extras {
            let index = e.index as usize;
            let extra_data = match (e.kind, e.extra_data) {
                (Some(kind), Some(v)) => ExtraData::decode(kind, &v),
                (None, Some(v)) => ExtraData::decode(ExtraDataSchema::Generic, &v),
                _ => None,
            };
            self.write_extras(index, extra_data, e.entity_id);
        }
        Ok(())
    }

    /// Build storage straight from a snapshot.
    pub fn from_snapshot(snapshot: TypedBlocksSnapshot) -> Result<Self, WorldError> {
        let mut blocks = Self::new(snapshot.size);
        blocks.restore_state(snapshot)?;
        Ok(blocks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotExtras {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ExtraDataSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

/// Serialized form of [`TypedBlocks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedBlocksSnapshot {
    pub size: ChunkSize,
    pub id: Vec<u32>,
    pub power: Vec<u32>,
    pub rotate: Vec<f32>,
    #[serde(default)]
    pub extras: Vec<SnapshotExtras>,
}

impl TypedBlocksSnapshot {
    /// JSON, deflated and base64 encoded for a `ChunkSnapshot` packet.
    pub fn pack(&self) -> Result<String, WorldError> {
        let json = serde_json::to_vec(self)?;
        Ok(compression::pack(&json)?)
    }

    pub fn unpack(data: &str) -> Result<Self, WorldError> {
        let json = compression::unpack(data)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

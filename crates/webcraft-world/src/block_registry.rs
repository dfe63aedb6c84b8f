//! Block type registry: id → derived block properties.
//!
//! Built once at startup from resource pack definitions and shared read-only
//! (`Arc<BlockRegistry>`) with chunk managers and workers. Re-registering an
//! existing id with the same name overrides it in place, which is how
//! extension packs patch base blocks.

use std::collections::{BTreeSet, HashMap};

use tracing::{error, info, warn};

use webcraft_resource_pack::{BlockDefinition, LightPower, LoadedResourcePack, PackConfig};

use crate::error::WorldError;
use crate::extra_data::ExtraDataSchema;

/// Reserved id of the empty cell.
pub const AIR_ID: u32 = 0;
/// Id of the sentinel returned for unknown lookups. Never registered.
pub const DUMMY_ID: u32 = u32::MAX;
/// Placement guard value: instances with this power are never stored.
pub const POWER_NO: u32 = 0;
/// Default stack size for inventory items.
pub const INVENTORY_STACK_DEFAULT_SIZE: u32 = 64;

const WATER_BLOCK_IDS: [u32; 2] = [200, 202];

/// Mesh batching group derived from style and tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StyleGroup {
    Regular,
    Transparent,
    Doubleface,
    DoublefaceTransparent,
}

impl StyleGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleGroup::Regular => "regular",
            StyleGroup::Transparent => "transparent",
            StyleGroup::Doubleface => "doubleface",
            StyleGroup::DoublefaceTransparent => "doubleface_transparent",
        }
    }
}

/// Fully derived properties for one block type.
#[derive(Debug, Clone)]
pub struct BlockType {
    pub id: u32,
    pub name: String,
    pub material: String,
    pub style: String,
    pub group: StyleGroup,
    pub transparent: bool,
    /// 0.0 = solid, 1.0 = fully walk-through.
    pub passable: f32,
    pub light_power: Option<LightPower>,
    /// Packed light value consumed by the light worker: emission (or 127
    /// for opaque blocks) plus 128 when the block occludes ambient light.
    pub light_power_number: u32,
    pub visible_for_ao: bool,
    pub is_fluid: bool,
    pub is_water: bool,
    /// Placing the block creates a server-side entity (chest and the like).
    pub is_entity: bool,
    pub gravity: bool,
    pub spawnable: bool,
    pub max_in_stack: u32,
    pub planting: bool,
    pub can_rotate: bool,
    pub selflit: bool,
    pub deprecated: bool,
    /// Default durability; [`POWER_NO`] when the definition sets none.
    pub power: u32,
    pub sound: Option<String>,
    pub tags: Vec<String>,
    pub resource_pack: String,
    /// `<pack>/<group>/<texture id>`, the key of this block's vertex group.
    pub material_key: String,
    pub tx_cnt: u32,
    pub extra_data_schema: ExtraDataSchema,
    /// Merged raw definition, kept so later overrides can inherit from it.
    pub definition: BlockDefinition,
}

impl BlockType {
    fn builtin(id: u32, name: &str) -> Self {
        let definition = BlockDefinition {
            id: Some(id),
            name: Some(name.to_string()),
            material: Some(webcraft_resource_pack::MaterialRef::Id("air".into())),
            transparent: Some(true),
            passable: Some(1.0),
            ..Default::default()
        };
        Self {
            id,
            name: name.to_string(),
            material: "air".into(),
            style: "default".into(),
            group: StyleGroup::Regular,
            transparent: true,
            passable: 1.0,
            light_power: None,
            light_power_number: 0,
            visible_for_ao: false,
            is_fluid: false,
            is_water: false,
            is_entity: false,
            gravity: false,
            spawnable: false,
            max_in_stack: INVENTORY_STACK_DEFAULT_SIZE,
            planting: false,
            can_rotate: false,
            selflit: false,
            deprecated: false,
            power: POWER_NO,
            sound: None,
            tags: Vec::new(),
            resource_pack: String::new(),
            material_key: String::new(),
            tx_cnt: webcraft_resource_pack::manifest::DEFAULT_TX_CNT,
            extra_data_schema: ExtraDataSchema::None,
            definition,
        }
    }

    pub fn is_air(&self) -> bool {
        self.id == AIR_ID
    }

    pub fn is_dummy(&self) -> bool {
        self.id == DUMMY_ID
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Solid, opaque cube that hides the faces of its neighbors.
    pub fn is_opaque_cube(&self) -> bool {
        !self.transparent && !self.is_air() && !self.is_dummy() && self.style == "default"
    }
}

/// What [`BlockRegistry::register`] did with a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    /// Same id and name: merged and replaced in place.
    Overridden,
    /// Same id, different name: the existing entry was kept.
    Conflict,
}

/// Registry of block types keyed by id.
pub struct BlockRegistry {
    blocks: HashMap<u32, BlockType>,
    by_name: HashMap<String, u32>,
    by_tag: HashMap<String, BTreeSet<u32>>,
    max_id: u32,
    dummy: BlockType,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry {
    /// Empty registry holding only `AIR`.
    pub fn new() -> Self {
        let mut reg = Self {
            blocks: HashMap::new(),
            by_name: HashMap::new(),
            by_tag: HashMap::new(),
            max_id: 0,
            dummy: BlockType::builtin(DUMMY_ID, "DUMMY"),
        };
        reg.insert_air();
        reg
    }

    fn insert_air(&mut self) {
        let air = BlockType::builtin(AIR_ID, "AIR");
        self.by_name.insert(air.name.clone(), AIR_ID);
        self.blocks.insert(AIR_ID, air);
    }

    /// Forget everything except `AIR`.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.by_name.clear();
        self.by_tag.clear();
        self.max_id = 0;
        self.insert_air();
    }

    /// Build a registry from packs in load order. Any invalid definition
    /// aborts the whole load.
    pub fn from_packs(packs: &[LoadedResourcePack]) -> Result<Self, WorldError> {
        let mut reg = Self::new();
        for pack in packs {
            reg.register_pack(pack)?;
        }
        info!(
            "Block registry ready: {} block types, max id {}",
            reg.len(),
            reg.max_id
        );
        Ok(reg)
    }

    /// Register every block of one pack. Returns how many were added or
    /// overridden.
    pub fn register_pack(&mut self, pack: &LoadedResourcePack) -> Result<usize, WorldError> {
        let mut count = 0;
        for def in &pack.blocks {
            let outcome = self.register(def.clone(), &pack.id, &pack.config)?;
            if outcome != RegisterOutcome::Conflict {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Validate, merge and derive one definition.
    pub fn register(
        &mut self,
        mut def: BlockDefinition,
        pack_id: &str,
        pack_conf: &PackConfig,
    ) -> Result<RegisterOutcome, WorldError> {
        let (Some(id), Some(name)) = (def.id, def.name.clone()) else {
            return Err(WorldError::InvalidBlockDefinition(format!(
                "block in pack '{pack_id}' is missing id or name"
            )));
        };
        if id == DUMMY_ID {
            return Err(WorldError::InvalidBlockDefinition(format!(
                "block '{name}' uses reserved id {id}"
            )));
        }

        let outcome = match self.blocks.get(&id) {
            Some(existing) if existing.name == name => {
                def.inherit_from(&existing.definition);
                RegisterOutcome::Overridden
            }
            Some(existing) => {
                error!(
                    "Duplicate block id {id}: '{name}' conflicts with '{}'",
                    existing.name
                );
                return Ok(RegisterOutcome::Conflict);
            }
            None => RegisterOutcome::Added,
        };

        let material = match def.material.as_ref().map(|m| m.id().trim()) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => {
                return Err(WorldError::InvalidBlockDefinition(format!(
                    "block '{name}' ({id}) has no material"
                )))
            }
        };

        let block = derive_block_type(id, name, material, def, pack_id, pack_conf);

        if let Some(old) = self.blocks.get(&id) {
            for tag in &old.tags {
                if let Some(ids) = self.by_tag.get_mut(tag) {
                    ids.remove(&id);
                }
            }
        }
        for tag in &block.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id);
        }
        self.by_name.insert(block.name.clone(), id);
        self.max_id = self.max_id.max(id);
        self.blocks.insert(id, block);

        Ok(outcome)
    }

    /// Block type by id, or the dummy sentinel for unknown ids.
    pub fn lookup_by_id(&self, id: u32) -> &BlockType {
        match self.blocks.get(&id) {
            Some(b) => b,
            None => {
                warn!("Unknown block id {id}");
                &self.dummy
            }
        }
    }

    /// Block type by name (`"ns:stone"` and `"stone"` both resolve to
    /// `STONE`), or the dummy sentinel.
    pub fn lookup_by_name(&self, name: &str) -> &BlockType {
        let bare = name.rsplit_once(':').map(|(_, n)| n).unwrap_or(name);
        let key = bare.to_uppercase();
        match self.by_name.get(&key).and_then(|id| self.blocks.get(id)) {
            Some(b) => b,
            None => {
                warn!("Unknown block name {name}");
                &self.dummy
            }
        }
    }

    /// Non-logging lookup.
    pub fn get(&self, id: u32) -> Option<&BlockType> {
        self.blocks.get(&id)
    }

    pub fn dummy(&self) -> &BlockType {
        &self.dummy
    }

    /// Ids carrying a tag, ascending.
    pub fn by_tag(&self, tag: &str) -> impl Iterator<Item = &BlockType> {
        self.by_tag
            .get(tag)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.blocks.get(id))
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ─── Derivation ─────────────────────────────────────────────────────────────

fn derive_block_type(
    id: u32,
    name: String,
    material: String,
    def: BlockDefinition,
    pack_id: &str,
    pack_conf: &PackConfig,
) -> BlockType {
    let style = def.style.clone().unwrap_or_else(|| "default".into());
    let tags = def.tags.clone().unwrap_or_default();
    let has_tag = |t: &str| tags.iter().any(|x| x == t);

    let transparent = def.transparent.unwrap_or(false) || style == "stairs";
    let group = style_group(id, &style, &tags);

    let sound = match &def.sound {
        Some(s) => Some(s.clone()),
        None if id > 0 && def.item.is_none() => {
            sound_material(&material).map(|m| format!("madcraft:block.{m}"))
        }
        None => None,
    };

    let planting = def.planting.unwrap_or(material == "plant");
    let can_rotate = def
        .can_rotate
        .unwrap_or_else(|| has_tag("trapdoor") || has_tag("stairs") || has_tag("door"));
    let is_fluid = def.is_fluid.unwrap_or(false);

    let ao_invisible = planting
        || matches!(style.as_str(), "fence" | "wall" | "pane" | "ladder")
        || def.light_power.is_some()
        || has_tag("no_drop_ao");
    let visible_for_ao = id >= 1 && !ao_invisible;

    let light_power_number = match def.light_power {
        Some(lp) => lp.a / 16,
        None if !transparent => 127,
        None => 0,
    } + if visible_for_ao { 128 } else { 0 };

    let texture_id = def.texture_id().map(str::to_string);
    let material_key = format!(
        "{pack_id}/{}/{}",
        group.as_str(),
        texture_id.as_deref().unwrap_or("default")
    );

    BlockType {
        id,
        name,
        material,
        group,
        transparent,
        passable: def.passable.unwrap_or(0.0),
        light_power: def.light_power,
        light_power_number,
        visible_for_ao,
        is_fluid,
        is_water: is_fluid && WATER_BLOCK_IDS.contains(&id),
        is_entity: has_tag("is_entity") || has_tag("chest"),
        gravity: def.gravity.unwrap_or(false),
        spawnable: def.spawnable.unwrap_or(true),
        max_in_stack: def.max_in_stack.unwrap_or(INVENTORY_STACK_DEFAULT_SIZE),
        planting,
        can_rotate,
        selflit: def.selflit.unwrap_or(false),
        deprecated: def.deprecated.unwrap_or(false),
        power: def.power.filter(|p| *p > 0).unwrap_or(POWER_NO),
        sound,
        resource_pack: pack_id.to_string(),
        material_key,
        tx_cnt: pack_conf.tx_cnt(texture_id.as_deref()),
        extra_data_schema: ExtraDataSchema::for_definition(&def),
        style,
        tags,
        definition: def,
    }
}

fn style_group(id: u32, style: &str, tags: &[String]) -> StyleGroup {
    let has_tag = |t: &str| tags.iter().any(|x| x == t);
    if WATER_BLOCK_IDS.contains(&id) || has_tag("alpha") {
        StyleGroup::DoublefaceTransparent
    } else if style == "pane" || has_tag("glass") {
        StyleGroup::Transparent
    } else if id == 649
        || has_tag("leaves")
        || matches!(
            style,
            "planting"
                | "chain"
                | "ladder"
                | "door"
                | "redstone"
                | "pot"
                | "lantern"
                | "azalea"
                | "bamboo"
                | "campfire"
                | "cocoa"
        )
    {
        StyleGroup::Doubleface
    } else {
        StyleGroup::Regular
    }
}

/// Sound family for a material class.
fn sound_material(material: &str) -> Option<&'static str> {
    match material {
        "stone" => Some("stone"),
        "grass" => Some("grass"),
        "wood" => Some("wood"),
        "glass" => Some("glass"),
        "sand" => Some("sand"),
        "ice" | "netherite" | "terracota" => Some("stone"),
        "plant" | "dirt" | "leaves" => Some("grass"),
        _ => None,
    }
}

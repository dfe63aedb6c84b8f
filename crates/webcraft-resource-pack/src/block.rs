//! Block definition parsing (blocks.json entries).
//!
//! Every field is optional at parse time: overriding definitions may omit
//! anything they want to inherit from the entry they replace. Required-field
//! validation happens at registration.

use serde::{Deserialize, Serialize};

/// Material reference: either `"stone"` or `{"id": "stone", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialRef {
    Id(String),
    Object { id: String },
}

impl MaterialRef {
    pub fn id(&self) -> &str {
        match self {
            MaterialRef::Id(id) => id,
            MaterialRef::Object { id } => id,
        }
    }
}

/// Emitted light color. `a` is the intensity (0..=255).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LightPower {
    #[serde(default)]
    pub r: u32,
    #[serde(default)]
    pub g: u32,
    #[serde(default)]
    pub b: u32,
    #[serde(default)]
    pub a: u32,
}

/// One raw entry of blocks.json.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passable: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_power: Option<LightPower>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Texture descriptor; only `texture.id` is interpreted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// Present when the block is only an inventory item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fluid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawnable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_stack: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_rotate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selflit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    /// Default durability of a freshly placed instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<u32>,
    /// Default per-instance state; its keys declare the extra_data schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_textures: Option<serde_json::Value>,
    /// Everything else, kept so an override can inherit it.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

macro_rules! inherit {
    ($new:ident, $old:ident, $($field:ident),+ $(,)?) => {
        $(
            if $new.$field.is_none() {
                $new.$field = $old.$field.clone();
            }
        )+
    };
}

impl BlockDefinition {
    /// Parse a blocks.json array.
    pub fn parse_list(json: &str) -> Result<Vec<Self>, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid blocks.json: {e}"))
    }

    /// Fill every property absent here from `old`. Properties present here win.
    pub fn inherit_from(&mut self, old: &BlockDefinition) {
        inherit!(
            self,
            old,
            id,
            name,
            material,
            style,
            transparent,
            passable,
            light_power,
            tags,
            texture,
            sound,
            item,
            is_fluid,
            gravity,
            spawnable,
            max_in_stack,
            planting,
            can_rotate,
            selflit,
            deprecated,
            power,
            extra_data,
            stage_textures,
        );
        for (k, v) in &old.extra {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// `texture.id` when the texture is an object carrying one.
    pub fn texture_id(&self) -> Option<&str> {
        self.texture.as_ref()?.get("id")?.as_str()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_deref()
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }
}

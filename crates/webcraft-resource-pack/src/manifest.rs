//! Resource pack conf.json parsing.

use std::collections::HashMap;

use serde::Deserialize;

/// Texture atlas columns when a texture entry does not specify `tx_cnt`.
pub const DEFAULT_TX_CNT: u32 = 32;

/// Top-level conf.json structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackConfig {
    /// Pack id. Falls back to the directory name when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Texture atlases keyed by texture id (`"default"` for the main atlas).
    #[serde(default)]
    pub textures: HashMap<String, TextureConf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextureConf {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tx_cnt: Option<u32>,
}

impl PackConfig {
    /// Parse a config from a JSON string.
    pub fn parse(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid conf.json: {e}"))
    }

    /// Atlas column count for a texture id (`default` when the block names
    /// none), or [`DEFAULT_TX_CNT`] if the atlas does not declare one.
    pub fn tx_cnt(&self, texture_id: Option<&str>) -> u32 {
        let key = texture_id.unwrap_or("default");
        self.textures
            .get(key)
            .and_then(|t| t.tx_cnt)
            .unwrap_or(DEFAULT_TX_CNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_conf() {
        let json = r#"{
            "id": "base",
            "name": "Base pack",
            "textures": {
                "default": { "image": "terrain.png", "tx_cnt": 64 },
                "extra": { "image": "extra.png" }
            }
        }"#;
        let conf = PackConfig::parse(json).unwrap();
        assert_eq!(conf.id.as_deref(), Some("base"));
        assert_eq!(conf.tx_cnt(None), 64);
        assert_eq!(conf.tx_cnt(Some("extra")), DEFAULT_TX_CNT);
        assert_eq!(conf.tx_cnt(Some("missing")), DEFAULT_TX_CNT);
    }

    #[test]
    fn parse_minimal_conf() {
        let conf = PackConfig::parse("{}").unwrap();
        assert!(conf.id.is_none());
        assert!(conf.textures.is_empty());
    }

    #[test]
    fn parse_invalid() {
        assert!(PackConfig::parse("[1,2]").is_err());
    }
}

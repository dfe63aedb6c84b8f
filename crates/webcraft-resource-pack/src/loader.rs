//! Resource pack loader: scans a directory and loads all packs.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::block::BlockDefinition;
use crate::manifest::PackConfig;

/// Id of the pack every other pack extends. Always loaded first.
pub const BASE_PACK_ID: &str = "base";

/// A fully loaded resource pack.
#[derive(Debug, Clone)]
pub struct LoadedResourcePack {
    pub id: String,
    pub path: PathBuf,
    pub config: PackConfig,
    pub blocks: Vec<BlockDefinition>,
}

/// Load a single resource pack from a directory.
pub fn load_resource_pack(path: &Path) -> Result<LoadedResourcePack, String> {
    let conf_str = std::fs::read_to_string(path.join("conf.json"))
        .map_err(|e| format!("read conf.json: {e}"))?;
    let config = PackConfig::parse(&conf_str)?;

    let blocks = match std::fs::read_to_string(path.join("blocks.json")) {
        Ok(s) => BlockDefinition::parse_list(&s)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(format!("read blocks.json: {e}")),
    };

    let id = config.id.clone().unwrap_or_else(|| {
        path.file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    });

    info!("Loaded resource pack '{}' ({} blocks)", id, blocks.len());

    Ok(LoadedResourcePack {
        id,
        path: path.to_path_buf(),
        config,
        blocks,
    })
}

/// Scan a directory for resource packs and load all of them.
///
/// The `base` pack comes first, the rest follow in id order, so overrides
/// from extension packs are registered after the definitions they replace.
/// A pack that fails to parse is an error: a partially loaded block list
/// would leave gaps in the id space.
pub fn load_all_packs(packs_dir: &Path) -> Result<Vec<LoadedResourcePack>, String> {
    let entries = match std::fs::read_dir(packs_dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Packs directory {} unreadable: {e}", packs_dir.display());
            return Ok(Vec::new());
        }
    };

    let mut packs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join("conf.json").exists() {
            let pack = load_resource_pack(&path)
                .map_err(|e| format!("resource pack at {}: {e}", path.display()))?;
            packs.push(pack);
        }
    }

    packs.sort_by(|a, b| {
        (a.id != BASE_PACK_ID)
            .cmp(&(b.id != BASE_PACK_ID))
            .then_with(|| a.id.cmp(&b.id))
    });

    if !packs.is_empty() {
        info!(
            "Loaded {} resource pack(s) from {}",
            packs.len(),
            packs_dir.display()
        );
    }

    Ok(packs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("webcraft_rp_test_{}", rand::random::<u64>()))
    }

    #[test]
    fn load_empty_directory() {
        let dir = temp_dir();
        let _ = fs::create_dir_all(&dir);
        let packs = load_all_packs(&dir).unwrap();
        assert!(packs.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_empty() {
        let packs = load_all_packs(&temp_dir()).unwrap();
        assert!(packs.is_empty());
    }

    #[test]
    fn base_pack_loads_first() {
        let dir = temp_dir();
        for (name, id) in [("a_ext", "alpha"), ("z_base", "base")] {
            let pack_dir = dir.join(name);
            fs::create_dir_all(&pack_dir).unwrap();
            fs::write(
                pack_dir.join("conf.json"),
                format!(r#"{{"id": "{id}", "textures": {{"default": {{"tx_cnt": 32}}}}}}"#),
            )
            .unwrap();
            fs::write(
                pack_dir.join("blocks.json"),
                r#"[{"id": 1, "name": "BEDROCK", "material": "stone"}]"#,
            )
            .unwrap();
        }
        // Directory without conf.json is ignored.
        fs::create_dir_all(dir.join("not_a_pack")).unwrap();

        let packs = load_all_packs(&dir).unwrap();
        assert_eq!(packs.len(), 2);
        assert_eq!(packs[0].id, "base");
        assert_eq!(packs[1].id, "alpha");
        assert_eq!(packs[0].blocks.len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn pack_id_defaults_to_dir_name() {
        let dir = temp_dir();
        let pack_dir = dir.join("mypack");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(pack_dir.join("conf.json"), "{}").unwrap();

        let pack = load_resource_pack(&pack_dir).unwrap();
        assert_eq!(pack.id, "mypack");
        assert!(pack.blocks.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn broken_blocks_json_fails() {
        let dir = temp_dir();
        let pack_dir = dir.join("broken");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(pack_dir.join("conf.json"), "{}").unwrap();
        fs::write(pack_dir.join("blocks.json"), "{").unwrap();

        assert!(load_all_packs(&dir).is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}

//! Per-instance block state (`extra_data`), decoded by block category.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use webcraft_proto::types::{BlockPos, Vec3};
use webcraft_resource_pack::BlockDefinition;

/// Which shape of extra data a block type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraDataSchema {
    None,
    Door,
    Trapdoor,
    Stage,
    Generic,
}

impl ExtraDataSchema {
    /// Derive the schema from a block definition's tags and defaults.
    pub fn for_definition(def: &BlockDefinition) -> Self {
        if def.has_tag("door") {
            ExtraDataSchema::Door
        } else if def.has_tag("trapdoor") {
            ExtraDataSchema::Trapdoor
        } else if def.stage_textures.is_some()
            || def
                .extra_data
                .as_ref()
                .is_some_and(|v| v.get("stage").is_some())
        {
            ExtraDataSchema::Stage
        } else if def.extra_data.is_some() {
            ExtraDataSchema::Generic
        } else {
            ExtraDataSchema::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DoorState {
    #[serde(default)]
    pub opened: bool,
    #[serde(default)]
    pub left: bool,
    #[serde(default)]
    pub point: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrapdoorState {
    #[serde(default)]
    pub opened: bool,
    #[serde(default)]
    pub point: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageState {
    pub stage: u32,
}

/// Decoded extra data. Serializes back to the same JSON object shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtraData {
    Door(DoorState),
    Trapdoor(TrapdoorState),
    Stage(StageState),
    Generic(Map<String, Value>),
}

impl ExtraData {
    /// Decode a raw payload according to `schema`.
    ///
    /// Payloads that do not fit the schema are kept as [`ExtraData::Generic`]
    /// so nothing a peer sent is lost. Non-object payloads are dropped.
    pub fn decode(schema: ExtraDataSchema, value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let typed = match schema {
            ExtraDataSchema::Door => DoorState::deserialize(value).ok().map(ExtraData::Door),
            ExtraDataSchema::Trapdoor => TrapdoorState::deserialize(value)
                .ok()
                .map(ExtraData::Trapdoor),
            ExtraDataSchema::Stage => StageState::deserialize(value).ok().map(ExtraData::Stage),
            ExtraDataSchema::None | ExtraDataSchema::Generic => None,
        };
        if typed.is_none() && !matches!(schema, ExtraDataSchema::None | ExtraDataSchema::Generic) {
            debug!("extra_data does not match {schema:?}, keeping as generic");
        }
        Some(typed.unwrap_or_else(|| ExtraData::Generic(obj.clone())))
    }

    /// Variant of this value, enough to decode its JSON form back into the
    /// same variant.
    pub fn kind(&self) -> ExtraDataSchema {
        match self {
            ExtraData::Door(_) => ExtraDataSchema::Door,
            ExtraData::Trapdoor(_) => ExtraDataSchema::Trapdoor,
            ExtraData::Stage(_) => ExtraDataSchema::Stage,
            ExtraData::Generic(_) => ExtraDataSchema::Generic,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn stage(&self) -> Option<u32> {
        match self {
            ExtraData::Stage(s) => Some(s.stage),
            _ => None,
        }
    }
}

/// Initial extra data for a freshly placed block.
///
/// Doors and trapdoors start closed at the clicked point. Other blocks copy
/// their declared default, resolving any `calculated` generators
/// (`pos`, `random_int`, `random_item`).
pub fn make_extra_data(
    schema: ExtraDataSchema,
    def: &BlockDefinition,
    pos: BlockPos,
    point: Vec3,
) -> Option<ExtraData> {
    match schema {
        ExtraDataSchema::Door => Some(ExtraData::Door(DoorState {
            opened: false,
            left: false,
            point,
        })),
        ExtraDataSchema::Trapdoor => Some(ExtraData::Trapdoor(TrapdoorState {
            opened: false,
            point,
        })),
        ExtraDataSchema::None => None,
        ExtraDataSchema::Stage | ExtraDataSchema::Generic => {
            let mut obj = def.extra_data.as_ref()?.as_object()?.clone();
            if let Some(Value::Array(generators)) = obj.remove("calculated") {
                let mut rng = rand::thread_rng();
                for g in &generators {
                    let Some(name) = g.get("name").and_then(Value::as_str) else {
                        debug!("calculated extra_data entry without name skipped");
                        continue;
                    };
                    let value = match g.get("type").and_then(Value::as_str) {
                        Some("pos") => serde_json::json!({"x": pos.x, "y": pos.y, "z": pos.z}),
                        Some("random_int") => {
                            let (min, max) = match g.get("min_max").and_then(Value::as_array) {
                                Some(mm) if mm.len() == 2 => (
                                    mm[0].as_i64().unwrap_or(0),
                                    mm[1].as_i64().unwrap_or(0),
                                ),
                                _ => continue,
                            };
                            if min > max {
                                continue;
                            }
                            Value::from(rng.gen_range(min..=max))
                        }
                        Some("random_item") => match g.get("items").and_then(Value::as_array) {
                            Some(items) if !items.is_empty() => {
                                items[rng.gen_range(0..items.len())].clone()
                            }
                            _ => Value::Null,
                        },
                        _ => continue,
                    };
                    obj.insert(name.to_string(), value);
                }
            }
            ExtraData::decode(schema, &Value::Object(obj))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(json: Value) -> BlockDefinition {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn schema_from_tags() {
        assert_eq!(
            ExtraDataSchema::for_definition(&def(json!({"tags": ["door"]}))),
            ExtraDataSchema::Door
        );
        assert_eq!(
            ExtraDataSchema::for_definition(&def(json!({"tags": ["trapdoor"]}))),
            ExtraDataSchema::Trapdoor
        );
        assert_eq!(
            ExtraDataSchema::for_definition(&def(json!({"extra_data": {"stage": 0}}))),
            ExtraDataSchema::Stage
        );
        assert_eq!(
            ExtraDataSchema::for_definition(&def(json!({"extra_data": {"text": ""}}))),
            ExtraDataSchema::Generic
        );
        assert_eq!(
            ExtraDataSchema::for_definition(&def(json!({}))),
            ExtraDataSchema::None
        );
    }

    #[test]
    fn decode_door() {
        let v = json!({"opened": true, "left": true, "point": {"x": 0.5, "y": 0.0, "z": 0.25}});
        let d = ExtraData::decode(ExtraDataSchema::Door, &v).unwrap();
        match &d {
            ExtraData::Door(s) => {
                assert!(s.opened && s.left);
                assert_eq!(s.point.x, 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(d.to_value(), v);
    }

    #[test]
    fn mismatched_payload_kept_generic() {
        let v = json!({"stage": "ripe"});
        let d = ExtraData::decode(ExtraDataSchema::Stage, &v).unwrap();
        assert!(matches!(d, ExtraData::Generic(_)));
        assert_eq!(d.to_value(), v);
    }

    #[test]
    fn non_object_dropped() {
        assert!(ExtraData::decode(ExtraDataSchema::Generic, &json!(5)).is_none());
    }

    #[test]
    fn stage_accessor() {
        let d = ExtraData::decode(ExtraDataSchema::Stage, &json!({"stage": 3})).unwrap();
        assert_eq!(d.stage(), Some(3));
    }

    #[test]
    fn make_door_starts_closed() {
        let d = def(json!({"tags": ["door"]}));
        let e = make_extra_data(
            ExtraDataSchema::Door,
            &d,
            BlockPos::new(0, 0, 0),
            Vec3::new(0.2, 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(
            e,
            ExtraData::Door(DoorState {
                opened: false,
                left: false,
                point: Vec3::new(0.2, 0.0, 0.0)
            })
        );
    }

    #[test]
    fn make_calculated_fields() {
        let d = def(json!({"extra_data": {
            "text": "hi",
            "calculated": [
                {"type": "pos", "name": "origin"},
                {"type": "random_int", "name": "n", "min_max": [2, 2]},
                {"type": "random_item", "name": "pick", "items": ["a"]}
            ]
        }}));
        let schema = ExtraDataSchema::for_definition(&d);
        let e = make_extra_data(schema, &d, BlockPos::new(1, 2, 3), Vec3::ZERO).unwrap();
        let v = e.to_value();
        assert_eq!(v["origin"], json!({"x": 1, "y": 2, "z": 3}));
        assert_eq!(v["n"], 2);
        assert_eq!(v["pick"], "a");
        assert!(v.get("calculated").is_none());
    }
}

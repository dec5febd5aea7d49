use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use space::Terrain;

use crate::error::ProtoError;

/// Cardinal movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Offset as (dy, dx), y growing downward.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Rain,
    Storm,
}

/// A multi-field wire payload. The `type` discriminator lets the decoder
/// reconstruct the exact variant without structural guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Model {
    /// Full snapshot of a placed entity. An absent position means the
    /// instance is removed pending respawn.
    Instance {
        id: i64,
        entity_id: i64,
        typename: String,
        name: String,
        room_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        amount: u32,
    },
    /// Sparse update: only fields that changed since the last snapshot.
    InstanceDelta {
        id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u32>,
    },
    Room {
        id: i64,
        name: String,
        height: i32,
        width: i32,
        ground: Vec<(i32, i32, Terrain)>,
        solid: Vec<(i32, i32, Terrain)>,
        roof: Vec<(i32, i32, Terrain)>,
    },
    PlayerInfo {
        player_id: i64,
        entity_id: i64,
        username: String,
        view_radius: i32,
    },
    ContainerItem {
        id: i64,
        item_entity_id: i64,
        name: String,
        amount: u32,
        max_stack_amt: u32,
    },
}

impl Model {
    /// A delta carrying no changed fields must be suppressed, never sent.
    pub fn is_empty_delta(&self) -> bool {
        matches!(
            self,
            Model::InstanceDelta {
                y: None,
                x: None,
                amount: None,
                ..
            }
        )
    }
}

/// The closed packet catalog.
///
/// Wire shape is a JSON object: `"a"` holds the action tag, `"p0"`, `"p1"`,
/// ... hold positional payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Ok,
    Deny { reason: String },
    Welcome { motd: String },
    Goodbye { instance_id: i64 },
    Login { username: String, password: String },
    Logout { username: String },
    Register { username: String, password: String },
    ModelUpdate { model: Model },
    Chat { message: String },
    Move { direction: Direction },
    MoveRooms { room_id: Option<i64> },
    Disconnect { username: String, reason: Option<String> },
    ServerLog { text: String },
    TickRate { hz: u32 },
    ClientKey { key: String },
    GrabItem,
    DropItem { container_item_id: i64, amount: u32 },
    WeatherChange { state: Weather },
}

/// Chat messages are truncated to this many characters server-side.
pub const CHAT_LIMIT: usize = 80;

impl Packet {
    pub fn action(&self) -> &'static str {
        match self {
            Packet::Ok => "Ok",
            Packet::Deny { .. } => "Deny",
            Packet::Welcome { .. } => "Welcome",
            Packet::Goodbye { .. } => "Goodbye",
            Packet::Login { .. } => "Login",
            Packet::Logout { .. } => "Logout",
            Packet::Register { .. } => "Register",
            Packet::ModelUpdate { .. } => "ModelUpdate",
            Packet::Chat { .. } => "Chat",
            Packet::Move { .. } => "Move",
            Packet::MoveRooms { .. } => "MoveRooms",
            Packet::Disconnect { .. } => "Disconnect",
            Packet::ServerLog { .. } => "ServerLog",
            Packet::TickRate { .. } => "TickRate",
            Packet::ClientKey { .. } => "ClientKey",
            Packet::GrabItem => "GrabItem",
            Packet::DropItem { .. } => "DropItem",
            Packet::WeatherChange { .. } => "WeatherChange",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut obj = Map::new();
        obj.insert("a".into(), json!(self.action()));
        let push = |obj: &mut Map<String, Value>, value: Value| {
            let index = obj.len() - 1;
            obj.insert(format!("p{index}"), value);
        };
        match self {
            Packet::Ok | Packet::GrabItem => {}
            Packet::Deny { reason } => push(&mut obj, json!(reason)),
            Packet::Welcome { motd } => push(&mut obj, json!(motd)),
            Packet::Goodbye { instance_id } => push(&mut obj, json!(instance_id)),
            Packet::Login { username, password }
            | Packet::Register { username, password } => {
                push(&mut obj, json!(username));
                push(&mut obj, json!(password));
            }
            Packet::Logout { username } => push(&mut obj, json!(username)),
            Packet::ModelUpdate { model } => {
                push(&mut obj, serde_json::to_value(model).expect("model serializes"));
            }
            Packet::Chat { message } => push(&mut obj, json!(message)),
            Packet::Move { direction } => {
                push(&mut obj, serde_json::to_value(direction).expect("direction serializes"));
            }
            Packet::MoveRooms { room_id } => push(&mut obj, json!(room_id)),
            Packet::Disconnect { username, reason } => {
                push(&mut obj, json!(username));
                if let Some(reason) = reason {
                    push(&mut obj, json!(reason));
                }
            }
            Packet::ServerLog { text } => push(&mut obj, json!(text)),
            Packet::TickRate { hz } => push(&mut obj, json!(hz)),
            Packet::ClientKey { key } => push(&mut obj, json!(key)),
            Packet::DropItem {
                container_item_id,
                amount,
            } => {
                push(&mut obj, json!(container_item_id));
                push(&mut obj, json!(amount));
            }
            Packet::WeatherChange { state } => {
                push(&mut obj, serde_json::to_value(state).expect("weather serializes"));
            }
        }
        serde_json::to_vec(&Value::Object(obj)).expect("packet serializes")
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| ProtoError::Malformed(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ProtoError::Malformed("payload is not an object".into()))?;
        let action = obj
            .get("a")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtoError::Malformed("missing action tag".into()))?;

        let packet = match action {
            "Ok" => Packet::Ok,
            "GrabItem" => Packet::GrabItem,
            "Deny" => Packet::Deny {
                reason: str_payload(obj, 0)?,
            },
            "Welcome" => Packet::Welcome {
                motd: str_payload(obj, 0)?,
            },
            "Goodbye" => Packet::Goodbye {
                instance_id: i64_payload(obj, 0)?,
            },
            "Login" => Packet::Login {
                username: str_payload(obj, 0)?,
                password: str_payload(obj, 1)?,
            },
            "Logout" => Packet::Logout {
                username: str_payload(obj, 0)?,
            },
            "Register" => Packet::Register {
                username: str_payload(obj, 0)?,
                password: str_payload(obj, 1)?,
            },
            "ModelUpdate" => Packet::ModelUpdate {
                model: typed_payload(obj, 0)?,
            },
            "Chat" => Packet::Chat {
                message: str_payload(obj, 0)?,
            },
            "Move" => Packet::Move {
                direction: typed_payload(obj, 0)?,
            },
            "MoveRooms" => Packet::MoveRooms {
                room_id: match obj.get("p0") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(v.as_i64().ok_or_else(|| {
                        ProtoError::Malformed("room id must be an integer".into())
                    })?),
                },
            },
            "Disconnect" => Packet::Disconnect {
                username: str_payload(obj, 0)?,
                reason: match obj.get("p1") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(
                        v.as_str()
                            .ok_or_else(|| {
                                ProtoError::Malformed("reason must be a string".into())
                            })?
                            .to_string(),
                    ),
                },
            },
            "ServerLog" => Packet::ServerLog {
                text: str_payload(obj, 0)?,
            },
            "TickRate" => Packet::TickRate {
                hz: u32_payload(obj, 0)?,
            },
            "ClientKey" => Packet::ClientKey {
                key: str_payload(obj, 0)?,
            },
            "DropItem" => Packet::DropItem {
                container_item_id: i64_payload(obj, 0)?,
                amount: u32_payload(obj, 1)?,
            },
            "WeatherChange" => Packet::WeatherChange {
                state: typed_payload(obj, 0)?,
            },
            other => return Err(ProtoError::UnknownAction(other.to_string())),
        };
        Ok(packet)
    }
}

fn payload<'a>(obj: &'a Map<String, Value>, index: usize) -> Result<&'a Value, ProtoError> {
    obj.get(&format!("p{index}"))
        .ok_or_else(|| ProtoError::Malformed(format!("missing payload p{index}")))
}

fn str_payload(obj: &Map<String, Value>, index: usize) -> Result<String, ProtoError> {
    payload(obj, index)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProtoError::Malformed(format!("payload p{index} must be a string")))
}

fn i64_payload(obj: &Map<String, Value>, index: usize) -> Result<i64, ProtoError> {
    payload(obj, index)?
        .as_i64()
        .ok_or_else(|| ProtoError::Malformed(format!("payload p{index} must be an integer")))
}

fn u32_payload(obj: &Map<String, Value>, index: usize) -> Result<u32, ProtoError> {
    i64_payload(obj, index)?
        .try_into()
        .map_err(|_| ProtoError::Malformed(format!("payload p{index} out of range")))
}

fn typed_payload<T: serde::de::DeserializeOwned>(
    obj: &Map<String, Value>,
    index: usize,
) -> Result<T, ProtoError> {
    serde_json::from_value(payload(obj, index)?.clone())
        .map_err(|e| ProtoError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(p: Packet) {
        let bytes = p.encode();
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded, p, "wire bytes: {}", String::from_utf8_lossy(&bytes));
    }

    #[test]
    fn roundtrip_whole_catalog() {
        roundtrip(Packet::Ok);
        roundtrip(Packet::Deny {
            reason: "Incorrect password".into(),
        });
        roundtrip(Packet::Welcome {
            motd: "Welcome, traveler".into(),
        });
        roundtrip(Packet::Goodbye { instance_id: 42 });
        roundtrip(Packet::Login {
            username: "alice".into(),
            password: "hunter2".into(),
        });
        roundtrip(Packet::Logout {
            username: "alice".into(),
        });
        roundtrip(Packet::Register {
            username: "bob".into(),
            password: "pw123".into(),
        });
        roundtrip(Packet::Chat {
            message: "hello there".into(),
        });
        roundtrip(Packet::Move {
            direction: Direction::Up,
        });
        roundtrip(Packet::MoveRooms { room_id: Some(3) });
        roundtrip(Packet::MoveRooms { room_id: None });
        roundtrip(Packet::Disconnect {
            username: "alice".into(),
            reason: Some("connection reset".into()),
        });
        roundtrip(Packet::Disconnect {
            username: "alice".into(),
            reason: None,
        });
        roundtrip(Packet::ServerLog {
            text: "alice has arrived.".into(),
        });
        roundtrip(Packet::TickRate { hz: 10 });
        roundtrip(Packet::ClientKey {
            key: "00112233445566778899aabbccddeeff".into(),
        });
        roundtrip(Packet::GrabItem);
        roundtrip(Packet::DropItem {
            container_item_id: 7,
            amount: 5,
        });
        roundtrip(Packet::WeatherChange {
            state: Weather::Storm,
        });
    }

    #[test]
    fn roundtrip_nested_models() {
        roundtrip(Packet::ModelUpdate {
            model: Model::Instance {
                id: 9,
                entity_id: 4,
                typename: "Player".into(),
                name: "alice".into(),
                room_id: 1,
                y: Some(5),
                x: Some(7),
                amount: 1,
            },
        });
        roundtrip(Packet::ModelUpdate {
            model: Model::Instance {
                id: 10,
                entity_id: 6,
                typename: "OreNode".into(),
                name: "Rich ore vein".into(),
                room_id: 1,
                y: None,
                x: None,
                amount: 1,
            },
        });
        roundtrip(Packet::ModelUpdate {
            model: Model::InstanceDelta {
                id: 9,
                y: Some(6),
                x: None,
                amount: None,
            },
        });
        roundtrip(Packet::ModelUpdate {
            model: Model::Room {
                id: 1,
                name: "Overworld".into(),
                height: 4,
                width: 4,
                ground: vec![(1, 1, Terrain::Grass)],
                solid: vec![(0, 0, Terrain::Wall)],
                roof: vec![],
            },
        });
        roundtrip(Packet::ModelUpdate {
            model: Model::PlayerInfo {
                player_id: 2,
                entity_id: 4,
                username: "alice".into(),
                view_radius: 10,
            },
        });
        roundtrip(Packet::ModelUpdate {
            model: Model::ContainerItem {
                id: 1,
                item_entity_id: 12,
                name: "Ore".into(),
                amount: 30,
                max_stack_amt: 100,
            },
        });
    }

    #[test]
    fn action_tag_on_wire() {
        let bytes = Packet::Ok.encode();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["a"], "Ok");
        assert!(value.get("p0").is_none());

        let bytes = Packet::Login {
            username: "alice".into(),
            password: "pw".into(),
        }
        .encode();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["a"], "Login");
        assert_eq!(value["p0"], "alice");
        assert_eq!(value["p1"], "pw");
    }

    #[test]
    fn model_payload_carries_type_discriminator() {
        let bytes = Packet::ModelUpdate {
            model: Model::InstanceDelta {
                id: 1,
                y: Some(2),
                x: None,
                amount: None,
            },
        }
        .encode();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["p0"]["type"], "InstanceDelta");
        assert_eq!(value["p0"]["y"], 2);
        // Unchanged fields stay off the wire entirely.
        assert!(value["p0"].get("x").is_none());
        assert!(value["p0"].get("amount").is_none());
    }

    #[test]
    fn unknown_action_is_fatal() {
        let result = Packet::decode(br#"{"a":"Teleport","p0":1}"#);
        assert!(matches!(result, Err(ProtoError::UnknownAction(tag)) if tag == "Teleport"));
    }

    #[test]
    fn missing_payload_is_malformed() {
        assert!(matches!(
            Packet::decode(br#"{"a":"Login","p0":"alice"}"#),
            Err(ProtoError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_payload_type_is_malformed() {
        assert!(matches!(
            Packet::decode(br#"{"a":"Goodbye","p0":"not a number"}"#),
            Err(ProtoError::Malformed(_))
        ));
        assert!(matches!(
            Packet::decode(br#"{"a":"Move","p0":"Sideways"}"#),
            Err(ProtoError::Malformed(_))
        ));
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(
            Packet::decode(b"[1,2,3]"),
            Err(ProtoError::Malformed(_))
        ));
        assert!(matches!(
            Packet::decode(b"garbage"),
            Err(ProtoError::Malformed(_))
        ));
    }

    #[test]
    fn empty_delta_detection() {
        let empty = Model::InstanceDelta {
            id: 1,
            y: None,
            x: None,
            amount: None,
        };
        assert!(empty.is_empty_delta());
        let delta = Model::InstanceDelta {
            id: 1,
            y: None,
            x: Some(3),
            amount: None,
        };
        assert!(!delta.is_empty_delta());
    }

    #[test]
    fn negative_amount_rejected() {
        assert!(matches!(
            Packet::decode(br#"{"a":"DropItem","p0":1,"p1":-4}"#),
            Err(ProtoError::Malformed(_))
        ));
    }
}

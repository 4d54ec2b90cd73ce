use crate::state::WorldState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server → Client: the only push message, always carrying the full state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "full-state-update")]
    FullStateUpdate { state: WorldState },
}

impl From<WorldState> for ServerMessage {
    fn from(state: WorldState) -> Self {
        ServerMessage::FullStateUpdate { state }
    }
}

/// Client → Server message types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Anchor drift correction `{id: {x, y, z}}`
    #[serde(rename = "anchors-update")]
    AnchorsUpdate { anchors: Map<String, Value> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Point3, Position};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_full_state_wire_format() {
        let msg = ServerMessage::from(WorldState {
            tag: Position { x: 1.0, y: 1.6, z: 2.0, timestamp: 3.0 },
            anchors: BTreeMap::from([("A0".to_string(), Point3::new(0.0, 2.0, 0.0))]),
        });

        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "full-state-update",
                "state": {
                    "tag": {"x": 1.0, "y": 1.6, "z": 2.0, "timestamp": 3.0},
                    "anchors": {"A0": {"x": 0.0, "y": 2.0, "z": 0.0}}
                }
            })
        );
    }

    #[test]
    fn test_parse_anchors_update() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"anchors-update","anchors":{"A1":{"x":12.1,"y":2.0,"z":0.0}}}"#,
        )
        .unwrap();
        let ClientMessage::AnchorsUpdate { anchors } = msg;
        assert_eq!(anchors["A1"]["x"], json!(12.1));
    }

    #[test]
    fn test_unknown_client_message_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}

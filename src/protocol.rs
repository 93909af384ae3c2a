//! Wire format: every frame is a two element array `[type, payload]`.
//!
//! Binary frames carry MessagePack with named fields, text frames carry the
//! same array as JSON. Message type numbers are shared with browser clients
//! and must not be reordered.

use crate::game::types::{Food, FoodId, Segment};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Join = 0,
    Input = 1,
    CollisionReport = 2,
    Ping = 3,
    JoinAccepted = 4,
    GameState = 5,
    PlayerDied = 6,
    FoodSpawned = 7,
    FoodEaten = 8,
    PlayerJoined = 9,
    KillFeed = 10,
    Pong = 11,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("msgpack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("msgpack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("json frame invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub username: String,
    #[serde(alias = "slitherAmount")]
    pub stake_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPayload {
    pub target_angle: f64,
    pub is_boosting: bool,
    #[serde(default)]
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionReportPayload {
    pub victim_id: String,
    pub killer_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePayload {
    pub time: f64,
}

/// Full entity, used where the receiver has no chain to reconstruct from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnakeState {
    pub id: String,
    pub username: String,
    pub color: u32,
    pub segments: Vec<Segment>,
    pub length: u32,
    pub radius: f64,
    pub is_boosting: bool,
    pub score: u32,
    pub cash: f64,
    pub is_spectator: bool,
}

/// Head-only entity for per-tick snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactSnake {
    pub id: String,
    pub username: String,
    pub color: u32,
    pub head: Segment,
    pub length: u32,
    pub radius: f64,
    pub is_boosting: bool,
    pub score: u32,
    pub cash: f64,
    pub is_spectator: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub username: String,
    pub score: u32,
    pub cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimapPayload {
    pub grid: Vec<Vec<bool>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
    pub snakes: Vec<SnakeState>,
    pub foods: Vec<Food>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub last_processed_input: HashMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAcceptedPayload {
    pub player_id: String,
    pub initial_state: InitialState,
    pub color: u32,
    pub starting_cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePayload {
    pub snakes: Vec<CompactSnake>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub last_processed_input: HashMap<String, u32>,
    pub total_players: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimap: Option<MinimapPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDiedPayload {
    pub player_id: String,
    pub death_foods: Vec<Food>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodSpawnedPayload {
    pub foods: Vec<Food>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEatenPayload {
    pub food_ids: Vec<FoodId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoinedPayload {
    pub snake: SnakeState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillFeedPayload {
    pub killer_name: String,
    pub victim_name: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<f64>,
    pub timestamp: i64,
}

macro_rules! tagged_message {
    ($name:ident { $($variant:ident($payload:ty)),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $($variant($payload)),+
        }

        impl $name {
            pub fn message_type(&self) -> MessageType {
                match self {
                    $($name::$variant(_) => MessageType::$variant),+
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut frame = serializer.serialize_tuple(2)?;
                frame.serialize_element(&(self.message_type() as u8))?;
                match self {
                    $($name::$variant(payload) => frame.serialize_element(payload)?),+
                }
                frame.end()
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct FrameVisitor;

                impl<'de> Visitor<'de> for FrameVisitor {
                    type Value = $name;

                    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                        formatter.write_str("a [type, payload] frame")
                    }

                    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<$name, A::Error> {
                        let tag: u8 = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                        $(
                            if tag == MessageType::$variant as u8 {
                                let payload: $payload = seq
                                    .next_element()?
                                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                                return Ok($name::$variant(payload));
                            }
                        )+
                        Err(de::Error::custom(format!("unknown message type {tag}")))
                    }
                }

                deserializer.deserialize_seq(FrameVisitor)
            }
        }
    };
}

tagged_message!(ClientMessage {
    Join(JoinPayload),
    Input(InputPayload),
    CollisionReport(CollisionReportPayload),
    Ping(TimePayload),
});

tagged_message!(ServerMessage {
    JoinAccepted(JoinAcceptedPayload),
    GameState(GameStatePayload),
    PlayerDied(PlayerDiedPayload),
    FoodSpawned(FoodSpawnedPayload),
    FoodEaten(FoodEatenPayload),
    PlayerJoined(PlayerJoinedPayload),
    KillFeed(KillFeedPayload),
    Pong(TimePayload),
});

impl ClientMessage {
    /// Boundary checks applied after a frame decodes.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientMessage::Join(join) => {
                if !join.stake_amount.is_finite() || join.stake_amount < 0.0 {
                    return Err(ProtocolError::Invalid {
                        field: "stakeAmount",
                        reason: "must be a finite, non-negative number",
                    });
                }
            }
            ClientMessage::Input(input) => {
                if !input.target_angle.is_finite() {
                    return Err(ProtocolError::Invalid {
                        field: "targetAngle",
                        reason: "must be finite",
                    });
                }
            }
            ClientMessage::CollisionReport(report) => {
                if report.victim_id.is_empty() || report.killer_id.is_empty() {
                    return Err(ProtocolError::Invalid {
                        field: "collisionReport",
                        reason: "ids must not be empty",
                    });
                }
            }
            ClientMessage::Ping(ping) => {
                if !ping.time.is_finite() {
                    return Err(ProtocolError::Invalid {
                        field: "time",
                        reason: "must be finite",
                    });
                }
            }
        }
        Ok(())
    }
}

pub fn decode_client_binary(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let message: ClientMessage = rmp_serde::from_slice(data)?;
    message.validate()?;
    Ok(message)
}

pub fn decode_client_text(text: &str) -> Result<ClientMessage, ProtocolError> {
    let message: ClientMessage = serde_json::from_str(text)?;
    message.validate()?;
    Ok(message)
}

pub fn encode_server_message(message: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    Ok(rmp_serde::to_vec_named(message)?)
}

pub fn encode_client_message(message: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    Ok(rmp_serde::to_vec_named(message)?)
}

pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    Ok(rmp_serde::from_slice(data)?)
}

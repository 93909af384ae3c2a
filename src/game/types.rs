use super::math::Vec2;
use serde::{Deserialize, Serialize};

pub type EntityId = String;
pub type FoodId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

impl Segment {
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self {
            x: position.x,
            y: position.y,
            angle,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    pub id: FoodId,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub value: f64,
    pub is_death_food: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

impl Food {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// One steering command as queued for the tick that drains it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputFrame {
    pub target_angle: f64,
    pub is_boosting: bool,
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeathCause {
    Wall,
    Collision,
    HeadOn,
}

impl DeathCause {
    /// Kill-feed method label: `wall` for boundary deaths, `snake` otherwise.
    pub fn method(self) -> &'static str {
        match self {
            DeathCause::Wall => "wall",
            DeathCause::Collision | DeathCause::HeadOn => "snake",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeathCause::Wall => "wall",
            DeathCause::Collision => "collision",
            DeathCause::HeadOn => "head-on",
        }
    }
}

/// Which authority asked for a death to be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathSource {
    ClientReport,
    ServerCheck,
}

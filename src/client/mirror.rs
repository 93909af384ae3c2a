use crate::game::constants::{BASE_SPEED, BOOST_SPEED_MULTIPLIER};
use crate::game::math::Vec2;
use crate::game::snake::{follow_chain, resize_chain, segment_count_for};
use crate::game::types::{EntityId, Segment};
use crate::protocol::{CompactSnake, SnakeState};

/// Client-side reconstruction of another player's body from head-only
/// snapshots, using the same chain-follow rule as the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnake {
    pub id: EntityId,
    pub username: String,
    pub color: u32,
    pub segments: Vec<Segment>,
    pub radius: f64,
    pub length: f64,
    pub is_boosting: bool,
    pub score: u32,
    pub cash: f64,
    pub is_spectator: bool,
    pub collided: bool,
}

impl RemoteSnake {
    pub fn from_state(state: &SnakeState) -> Self {
        let mut segments = state.segments.clone();
        if segments.is_empty() {
            segments.push(Segment::new(Vec2::ZERO, 0.0));
        }
        Self {
            id: state.id.clone(),
            username: state.username.clone(),
            color: state.color,
            segments,
            radius: state.radius,
            length: f64::from(state.length),
            is_boosting: state.is_boosting,
            score: state.score,
            cash: state.cash,
            is_spectator: state.is_spectator,
            collided: false,
        }
    }

    /// First sighting through a snapshot: the whole chain starts stacked on
    /// the head and unfolds over the following updates.
    pub fn from_compact(compact: &CompactSnake) -> Self {
        let length = f64::from(compact.length);
        Self {
            id: compact.id.clone(),
            username: compact.username.clone(),
            color: compact.color,
            segments: vec![compact.head; segment_count_for(length)],
            radius: compact.radius,
            length,
            is_boosting: compact.is_boosting,
            score: compact.score,
            cash: compact.cash,
            is_spectator: compact.is_spectator,
            collided: false,
        }
    }

    pub fn head(&self) -> Segment {
        self.segments[0]
    }

    pub fn head_position(&self) -> Vec2 {
        self.segments[0].position()
    }

    pub fn angle(&self) -> f64 {
        self.segments[0].angle
    }

    /// Applies one snapshot. A body frozen by an optimistic death keeps its
    /// pose until it is confirmed or rolled back.
    pub fn apply_compact(&mut self, compact: &CompactSnake, dt: f64) {
        self.score = compact.score;
        self.cash = compact.cash;
        if self.collided {
            return;
        }
        self.radius = compact.radius;
        self.length = f64::from(compact.length);
        self.is_boosting = compact.is_boosting;
        self.is_spectator = compact.is_spectator;

        self.segments[0] = compact.head;
        let speed = if self.is_boosting {
            BASE_SPEED * BOOST_SPEED_MULTIPLIER
        } else {
            BASE_SPEED
        };
        follow_chain(&mut self.segments, speed, dt.max(0.0));
        resize_chain(&mut self.segments, segment_count_for(self.length));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compact(id: &str, head: Vec2, length: u32) -> CompactSnake {
        CompactSnake {
            id: id.to_string(),
            username: id.to_string(),
            color: 0,
            head: Segment::new(head, 0.0),
            length,
            radius: 10.0,
            is_boosting: false,
            score: length * 2,
            cash: 1.0,
            is_spectator: false,
        }
    }

    #[test]
    fn chain_tracks_length_and_follows_head() {
        let mut remote = RemoteSnake::from_compact(&compact("r", Vec2::ZERO, 10));
        assert_eq!(remote.segments.len(), 10);
        for step in 1..=30 {
            remote.apply_compact(&compact("r", Vec2::new(step as f64 * 2.5, 0.0), 12), 1.0);
        }
        assert_eq!(remote.segments.len(), 12);
        assert_eq!(remote.head_position(), Vec2::new(75.0, 0.0));
        assert!(remote.segments[1].x < remote.head_position().x);
        assert!(remote.segments[1].x > 0.0);
    }

    #[test]
    fn collided_body_is_frozen() {
        let mut remote = RemoteSnake::from_compact(&compact("r", Vec2::ZERO, 10));
        remote.collided = true;
        let before = remote.segments.clone();
        remote.apply_compact(&compact("r", Vec2::new(50.0, 0.0), 10), 1.0);
        assert_eq!(remote.segments, before);
    }
}

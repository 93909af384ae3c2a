//! Gameplay tuning shared by the server simulation and the client predictor.
//!
//! Distances are world units, speeds are units per 60 Hz frame. `dt` everywhere
//! is measured in those frames, so a 33 ms tick passes `dt ~= 2.0`.

pub const WORLD_RADIUS: f64 = 800.0;
pub const WALL_KILL_THRESHOLD: f64 = 5.0;
pub const WALL_COLLISION_ANGLE_DEGREES: f64 = 180.0;

pub const FRAME_MS: f64 = 1000.0 / 60.0;
pub const DEFAULT_TICK_RATE: u32 = 60;

pub const INITIAL_SEGMENT_COUNT: usize = 5;
pub const MIN_BOOST_LENGTH: f64 = 5.0;
pub const MAX_ENTRY_LENGTH: f64 = 2000.0;
pub const ENTRY_LENGTH_PER_STAKE: f64 = 1000.0;
pub const BASE_SPEED: f64 = 2.5;
pub const BOOST_SPEED_MULTIPLIER: f64 = 3.0;
pub const TURN_SPEED: f64 = 0.1;
pub const TARGET_DISTANCE: f64 = 100.0;
pub const SEGMENT_LERP_FACTOR: f64 = 0.2;
pub const SEGMENT_TURN_FACTOR: f64 = 0.3;
pub const SEGMENT_TURN_FACTOR_MAX: f64 = 0.5;
pub const GROWTH_ANIMATION_SPEED: f64 = 0.2;
pub const SEGMENT_GROWTH_MULTIPLIER: f64 = 0.2;
pub const SCORE_PER_LENGTH_UNIT: f64 = 2.0;
pub const LENGTH_DRAIN_RATE_PER_TICK: f64 = 0.01;
pub const BOOST_LENGTH_TO_DROP_MIN: f64 = 0.1;
pub const BOOST_LENGTH_TO_DROP_MAX: f64 = 1.5;

pub const BASE_SEGMENT_RADIUS: f64 = 10.0;
pub const GROWTH_FACTOR: f64 = 0.009;
pub const MAX_GROWTH_LENGTH: f64 = 300.0;
pub const RADIUS_GROWTH_OFFSET: f64 = 10.0;

pub const TIP_PROJECTION_FACTOR: f64 = 0.2;
pub const TIP_ANGLE_DEGREES: f64 = 20.0;
pub const SELF_COLLISION_NECK: usize = 4;
pub const SNAKE_QUERY_RADIUS_FACTOR: f64 = 3.0;
pub const FOOD_QUERY_RADIUS_FACTOR: f64 = 2.0;
pub const SPATIAL_CELL_SIZE: f64 = 150.0;

pub const FOOD_BASE_RADIUS: f64 = 3.0;
pub const MAX_FOOD_RADIUS: f64 = 7.0;
pub const MAX_FOOD_ITEMS: usize = 4096;
pub const DEATH_FOOD_STRIDE: usize = 4;
pub const DEATH_FOOD_VALUE_FACTOR: f64 = 0.5;
pub const DEATH_FOOD_OFFSET_FACTOR: f64 = 0.1;
pub const DEATH_FOOD_JITTER_FACTOR: f64 = 0.23;
pub const FOOD_RADIUS_OF_INTEREST: f64 = 600.0;
pub const FOOD_RESPAWN_EXCLUSION: f64 = 600.0;
pub const FOOD_RESPAWN_ATTEMPTS: usize = 20;
pub const FOOD_QUADTREE_CAPACITY: usize = 10;

pub const PAYOUT_FRACTION: f64 = 0.7;

pub const SPAWN_CANDIDATES: usize = 50;
pub const SPAWN_WALL_MARGIN: f64 = 50.0;

pub const FOOD_CHECK_INTERVAL_MS: f64 = 1000.0;
pub const MINIMAP_UPDATE_INTERVAL_MS: f64 = 3000.0;
pub const MINIMAP_GRID_SIZE: usize = 40;
pub const COLLISION_VOTE_TIMEOUT_MS: i64 = 150;
pub const LEADERBOARD_SIZE: usize = 10;

pub const DEFAULT_MAX_PLAYERS_PER_ROOM: usize = 50;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub const COLOR_POOL: [u32; 14] = [
    0xf2d5cf, 0xeebebe, 0xf4b8e4, 0xca9ee6, 0xe78284, 0xea999c, 0xef9f76, 0xe5c890, 0xa6d189,
    0x81c8be, 0x99d1db, 0x85c1dc, 0x8caaee, 0xbabbf1,
];

pub mod client {
    //! Cadences and windows used only by the predicting client.

    pub const GRID_REBUILD_INTERVAL_MS: i64 = 33;
    pub const HEAD_CHECK_INTERVAL_MS: i64 = 16;
    pub const COLLISION_TIMEOUT_MS: i64 = 1000;
    pub const ROLLBACK_EXPIRY_MS: i64 = 2000;
    pub const REPORT_COOLDOWN_MS: i64 = 100;
    pub const POOL_INITIAL_SIZE: usize = 2000;
    pub const POOL_MAX_SIZE: usize = 8000;
    pub const MIN_GRID_CELL_SIZE: f64 = 100.0;

    pub const ATTRACTION_RADIUS_BASE: f64 = 33.0;
    pub const ATTRACTION_RADIUS_GROWTH_FACTOR: f64 = 1.5;
    pub const ATTRACTION_SPEED: f64 = 300.0;
    pub const FINAL_SCALE_PERCENT: f64 = 0.9;
    pub const ATTRACTION_CONE_ANGLE: f64 = std::f64::consts::PI / 3.0;
}

pub mod collision;
pub mod constants;
pub mod food;
pub mod math;
pub mod minimap;
pub mod quadtree;
pub mod room;
pub mod settlement;
pub mod snake;
pub mod spatial;
pub mod types;
pub mod world;

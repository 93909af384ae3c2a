pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod pricing;
pub mod protocol;
pub mod room_runtime;
pub mod shared;
pub mod transport;

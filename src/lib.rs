pub mod config;
pub mod connection;
pub mod drone;
pub mod error;
pub mod flight_plan;
pub mod flight_time;
pub mod link;
pub mod model;
pub mod telemetry;
pub mod util;
pub mod vehicle;
pub mod web_server;

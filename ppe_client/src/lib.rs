mod routes;

pub mod app;
pub mod client;
pub mod config;
pub mod detection;
pub mod intake;
pub mod render;
pub mod server;
pub mod session;
pub mod telemetry;

pub use app::start_app;

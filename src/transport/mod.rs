pub mod events;
pub mod gate;
pub mod http_server;

pub use http_server::ReadinessServer;

pub mod config;
pub mod session;
pub mod suggest;
pub mod telemetry;
pub mod terminal;
pub mod transport;
pub mod wake_lock;

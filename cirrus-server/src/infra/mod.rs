pub mod app_state;
pub mod errors;
pub mod shutdown;
pub mod telemetry;

pub mod event;
pub mod parameters;
pub mod snapshot;
pub mod telemetry_service;

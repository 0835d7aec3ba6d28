pub mod connection_state;
pub mod session_scheduler;

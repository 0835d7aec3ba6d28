pub mod command_client;
pub mod command_schema;
pub mod command_service;

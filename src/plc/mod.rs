pub mod codec;
pub mod field_map;
pub mod plc_link;
pub mod register_block;
pub mod s7_client;
pub mod transport;

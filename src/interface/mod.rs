pub mod client_server;
pub mod tcp_server;

pub mod http_client;
pub mod route_source;

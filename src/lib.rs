// Legalisir Console - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod permohonan;
pub mod transport;

#[cfg(test)]
mod test_support;

//! Static file server with flat-file user registration, login and cookie sessions.

pub mod auth;
pub mod config;
pub mod gateway;

pub use config::Config;

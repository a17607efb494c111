//! Configuration loaded from the environment (`.env` supported)

pub mod db;

pub use db::DbConfig;

pub mod data_service;
pub mod db;

pub use data_service::{DataService, DataServiceImpl};

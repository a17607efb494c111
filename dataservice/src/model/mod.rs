pub mod get_data_request;

pub use get_data_request::GetDataRequest;

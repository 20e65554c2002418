pub mod message;
pub mod request;

pub mod client;
pub mod configs;
pub mod errors;
pub mod extract;
pub mod jobs;
pub mod normalize;
pub mod providers;
pub mod session;
pub mod upload;

pub mod base;
pub mod credential;
pub mod settings;

pub use credential::Credential;
pub use settings::Settings;

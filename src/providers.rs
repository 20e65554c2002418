pub mod base;
pub mod serving;
pub mod types;

#[cfg(test)]
pub mod mock;

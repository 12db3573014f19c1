pub mod error;
pub mod label;

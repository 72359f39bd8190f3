//! Application services layer.

pub mod catalog;
pub mod digest;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod repos;
pub mod settings;

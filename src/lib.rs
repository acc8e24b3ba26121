pub mod audio;
pub mod auth;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod models;
pub mod music;
pub mod results;
pub mod retry;
pub mod session;
pub mod store;


pub use error::*;
pub use models::*;

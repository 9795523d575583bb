pub mod chain;
pub mod models;
pub mod utils;

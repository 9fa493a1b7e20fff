pub mod config;
pub mod error;
pub mod search;
pub mod store;

pub use error::{Result, SearchError};
pub use search::SearchEngine;

pub mod config;
pub mod contracts;
pub mod db;
pub mod error;
pub mod types;

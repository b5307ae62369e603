pub mod api;
pub mod config;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod order;
pub mod service;
pub mod types;
pub mod utils;
pub mod validation;

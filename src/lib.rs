pub mod app;
pub mod biomart;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod retry;
pub mod store;
pub mod table;
pub mod tui;

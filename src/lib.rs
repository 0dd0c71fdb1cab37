// src/lib.rs
//! Team task dashboard backed by a Google Sheets spreadsheet or a
//! directory of CSV files.

pub mod aggregate;
pub mod cloud_handler;
pub mod config;
pub mod csv_handler;
pub mod data_types;
pub mod error;
pub mod mapper;
pub mod store;
pub mod sync;
pub mod ui;

pub use aggregate::{aggregate, CategorySort, ViewModel};
pub use config::Config;
pub use data_types::{DataSource, Record, TableData, Vocabulary};
pub use error::{ConfigError, StoreError};
pub use store::TabularStore;
pub use sync::{Dashboard, Snapshot};

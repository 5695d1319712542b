pub mod absence;
pub mod api;
pub mod calendar;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod import;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod report;
pub mod server;
pub mod settings;
pub mod store;
pub mod sweep;

pub use api::create_router;
pub use api::state::AppState;

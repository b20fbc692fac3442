pub mod allocation;
pub mod clock;
pub mod codes;
pub mod config;
pub mod handlers;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod routes;
pub mod state;
pub mod status;
pub mod store;
pub mod utils;

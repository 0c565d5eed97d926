//! Core library for platecost: pricing normalization and recipe cost
//! roll-up over an operator-edited catalog.
//!
//! The costing engine (`pricing`, `costing`) is pure over the
//! [`datasource::CostDataSource`] read-shape; the SQLite catalog (`db`)
//! implements it, and [`service::CostService`] ties both together for the
//! CLI.

pub mod costing;
pub mod datasource;
pub mod db;
pub mod error;
pub mod models;
pub mod pack;
pub mod price_import;
pub mod pricing;
pub mod service;
pub mod units;

pub use error::CostError;
pub use units::BaseUnit;

//! Headless application layer: the data-service boundary, settings, and the
//! `GraphController` that shells drive.

pub mod controller;
pub mod service;
pub mod settings;

pub use controller::{GraphController, GraphSnapshot};
pub use service::{GraphDataService, GraphFilters, HttpGraphService, StaticGraphService};
pub use settings::{DataServiceSettings, GraphSettings};

//! # Gridcast workspace
//!
//! Umbrella crate re-exporting the forecasting pipeline and its numeric
//! helpers.
//!
//! ## Example
//!
//! ```
//! use gridcast_workspace::grid_math::CyclicalComponent;
//! use gridcast_workspace::gridcast::DayForecast;
//!
//! let forecast = DayForecast::constant(950.0).unwrap();
//! assert_eq!(forecast.values().len(), 24);
//! assert_eq!(CyclicalComponent::Hour.period(), 24.0);
//! ```

pub use grid_math;
pub use gridcast;

/// Version of the workspace facade
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

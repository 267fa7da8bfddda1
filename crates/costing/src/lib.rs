//! Cost Calculation Engine (pure domain).
//!
//! Converts a manufacturing process route, a target quantity and a snapshot of
//! cost parameters into a priced [`CostCalculation`]. Lookups of routes, steps
//! and equipment, numbering and persistence are done by the caller; nothing in
//! this crate performs IO.

pub mod calculation;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod parameters;
pub mod request;

pub use calculation::{CalculationStatus, CostCalculation, CostCalculationDetail, NewCalculation};
pub use catalog::{
    Equipment, ProcessRouteDetail, ProcessStep, ProductProcessRoute, RouteOrigin,
    select_route_for_category,
};
pub use engine::{ANNUAL_OPERATING_HOURS, CostBreakdown, CostEngine, ResolvedStep};
pub use error::CostingError;
pub use parameters::CostParameters;
pub use request::{CalculationRequest, CustomRoute, CustomRouteStep, RouteSelection};

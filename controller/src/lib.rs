//! hashpilot controller — telemetry collection, switching actuator and the
//! control loop that ties them to the decision engine.

pub mod actuator;
pub mod client;
pub mod collector;
pub mod config;
pub mod control;
pub mod telemetry;
pub mod util;

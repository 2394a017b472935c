//! hashpilot core — donation decision engine and durable state store.
//!
//! This crate is the I/O-free heart of the controller: the pure decision
//! algorithm, the tier table it consults, and the crash-safe state store
//! that makes decisions auditable and resumable. Network clients, telemetry
//! collection and the actuator live in the controller crate.

pub mod engine;
pub mod store;
pub mod tiers;
pub mod types;

pub use engine::{decide, EngineConfig, EngineInput, PoolHealth};
pub use store::{StateStore, StoreError, StoreOptions};
pub use tiers::{Tier, TierTable};
pub use types::{
    Decision, DecisionMode, DonationStats, HistoryPoint, Mode, PoolVariant, ShareRecord,
    StatsPatch, WorkerRecord,
};

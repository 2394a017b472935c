//! HTTP clients for the external collaborators: the shared proxy, the
//! per-worker control endpoints and the donation-performance service.

pub mod bonus;
pub mod proxy;
pub mod worker;

pub use bonus::{BonusClient, BonusStats};
pub use proxy::{ProxyClient, ProxyWorkerRow};
pub use worker::{auth_token, candidate_addrs, WorkerClient, WorkerSummary};

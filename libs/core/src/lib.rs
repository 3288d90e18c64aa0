//! # rulepool-core
//!
//! Places one-shot scheduled rules onto a pool of event buses whose
//! scheduling backend caps the number of rules per bus and the number of
//! buses per account.
//!
//! ## Architecture
//!
//! ```text
//! Pool (Allocator)
//! ├── Inventory            (ordered, rebuilt from the backend every pass)
//! │   └── Bus (Container)  (rule map + create/delete/materialize)
//! │       └── Rule (SchedulableUnit)
//! └── SchedulerBackend     (memory, HTTP, or retrying decorator)
//! ```
//!
//! A pass is always: reconcile the inventory, plan, place, collect empty
//! buses. Nothing is cached between passes because fired rules delete
//! themselves out of band (see [`fire`]).
//!
//! ## Modules
//!
//! - `backend`: the backend trait and its implementations
//! - `placement`: pure planning plus the placement pass written against the
//!   role traits
//! - `pool`: the backend-facing allocator
//! - `fire`: the fire-and-self-delete handler run by the compute target

pub mod backend;
pub mod bus;
pub mod config;
pub mod error;
pub mod fire;
pub mod inventory;
pub mod placement;
pub mod pool;
pub mod roles;
pub mod rule;

// Re-export commonly used types
pub use backend::{BackendError, SchedulerBackend};
pub use bus::Bus;
pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use inventory::Inventory;
pub use placement::{next_free_index, plan_placement, Placement, PlacementPlan};
pub use pool::Pool;
pub use roles::{Allocator, Container, SchedulableUnit};
pub use rule::{Rule, RuleTarget};

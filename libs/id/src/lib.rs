//! # rulepool-id
//!
//! Identifier types shared by the rulepool allocator, the scheduler service,
//! and the operator CLI.
//!
//! ## Naming
//!
//! - Buses owned by a pool are named `{prefix}-{index}` with `index >= 1`.
//!   Index 0 is reserved for the pre-existing default bus, which keeps its
//!   own unprefixed name (usually `default`).
//! - Rules are named after the bus they were placed on plus a ULID
//!   uniquifier: `{bus}-{ulid}`.
//! - Target attachments and API requests use prefixed ULIDs
//!   (`tgt_01HV...`, `req_01HV...`).

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

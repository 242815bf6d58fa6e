//! # Drover Address Migration (drover-am)
//!
//! One-shot migration engine for the Drover platform: resolves free-text
//! delivery addresses on legacy orders to canonical structured addresses,
//! deduplicates them per (tenant, country, content hash), and re-links the
//! orders in transactional batches.
//!
//! Pipeline: candidate scan -> resolver (with retry) -> canonicalizer ->
//! address store (find-or-insert) -> order linkage -> batch commit -> report.

pub mod canonical;
pub mod migration;
pub mod resolver;
pub mod retry;
pub mod store;

pub use migration::{MigrationFault, MigrationRunner, MigrationStats};
pub use resolver::{AddressResolver, HttpAddressResolver, Resolution, ResolveError, ResolvedAddress};
pub use retry::RetryPolicy;

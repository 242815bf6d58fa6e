//! Batch migration orchestrator
//!
//! Drives the end-to-end run: fetch the candidate set up front, partition it
//! into fixed-size batches, and process records strictly in order. Each live
//! batch runs inside one transaction; a storage fault rolls the whole batch
//! back and halts the run, while batches already committed stay committed.
//! Per-record semantic failures are absorbed and tallied, never fatal.
//!
//! Dry-run mode skips the transaction and every write but still resolves,
//! hashes, and performs dedup lookups so the report shows what a live run
//! would have done.

use crate::canonical::content_hash;
use crate::resolver::{AddressResolver, Resolution};
use crate::retry::{resolve_with_retry, RetryPolicy};
use crate::store::{self, CanonicalAddress, LinkageUpdate, ValidationStatus};
use drover_common::db::models::Order;
use drover_common::Error;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

/// Default records per transactional batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Process-wide migration counters, finalized into the run report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationStats {
    pub total_candidates: u64,
    pub succeeded: u64,
    /// Semantic failures, including retries-exhausted downgrades
    pub failed: u64,
    pub deduplicated: u64,
    pub created: u64,
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl MigrationStats {
    /// Successful records per elapsed second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.succeeded as f64 / secs
        } else {
            0.0
        }
    }

    /// Operator-facing run report
    pub fn report(&self) -> String {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        format!(
            "Address migration report{}\n\
             \x20 duration:          {:.2}s\n\
             \x20 throughput:        {:.1} records/s\n\
             \x20 total candidates:  {}\n\
             \x20 succeeded:         {}\n\
             \x20 semantic failures: {}\n\
             \x20 new addresses:     {}\n\
             \x20 deduplicated hits: {}",
            mode,
            self.elapsed.as_secs_f64(),
            self.throughput(),
            self.total_candidates,
            self.succeeded,
            self.failed,
            self.created,
            self.deduplicated,
        )
    }

    fn merge(&mut self, batch: &BatchTally) {
        self.succeeded += batch.succeeded;
        self.failed += batch.failed;
        self.deduplicated += batch.deduplicated;
        self.created += batch.created;
    }
}

/// Counters for one batch, merged into the run stats only after commit so a
/// rolled-back batch never shows up in the report
#[derive(Debug, Default)]
struct BatchTally {
    succeeded: u64,
    failed: u64,
    deduplicated: u64,
    created: u64,
}

impl BatchTally {
    fn records(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Fatal run error: a storage fault rolled back the current batch
///
/// Carries enough context to resume manually; `partial` covers committed
/// batches only. There is no automatic resume — a rerun is idempotent because
/// linked orders leave the candidate set.
#[derive(Debug, ThisError)]
#[error("migration halted: batch {batch_index} rolled back after {records_processed} committed records: {source}")]
pub struct MigrationFault {
    pub batch_index: usize,
    pub records_processed: u64,
    pub partial: MigrationStats,
    #[source]
    pub source: Error,
}

/// Batch migration runner
///
/// Store and resolver are constructor-injected so tests substitute in-memory
/// fakes. One logical worker: batches and the records inside them are
/// processed sequentially.
pub struct MigrationRunner {
    pool: SqlitePool,
    resolver: Arc<dyn AddressResolver>,
    policy: RetryPolicy,
    batch_size: usize,
    dry_run: bool,
}

impl MigrationRunner {
    pub fn new(pool: SqlitePool, resolver: Arc<dyn AddressResolver>) -> Self {
        Self {
            pool,
            resolver,
            policy: RetryPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute the migration and return the final stats
    pub async fn run(&self) -> Result<MigrationStats, MigrationFault> {
        let started = Instant::now();
        let mut stats = MigrationStats {
            dry_run: self.dry_run,
            ..Default::default()
        };

        let candidates = match store::fetch_candidates(&self.pool).await {
            Ok(candidates) => candidates,
            Err(source) => {
                stats.elapsed = started.elapsed();
                return Err(MigrationFault {
                    batch_index: 0,
                    records_processed: 0,
                    partial: stats,
                    source,
                });
            }
        };

        stats.total_candidates = candidates.len() as u64;
        info!(
            candidates = candidates.len(),
            batch_size = self.batch_size,
            dry_run = self.dry_run,
            "Starting address migration"
        );

        // Stand-in for would-be inserts while dry-running
        let mut seen_keys: HashSet<(String, String, String)> = HashSet::new();
        let mut committed_records: u64 = 0;

        for (batch_index, batch) in candidates.chunks(self.batch_size).enumerate() {
            let result = if self.dry_run {
                self.process_batch_dry(batch, &mut seen_keys).await
            } else {
                self.process_batch_live(batch).await
            };

            match result {
                Ok(tally) => {
                    debug!(
                        batch = batch_index,
                        succeeded = tally.succeeded,
                        failed = tally.failed,
                        "Batch committed"
                    );
                    committed_records += tally.records();
                    stats.merge(&tally);
                }
                Err(source) => {
                    stats.elapsed = started.elapsed();
                    warn!(
                        batch = batch_index,
                        committed_records,
                        error = %source,
                        "Batch rolled back; halting run"
                    );
                    return Err(MigrationFault {
                        batch_index,
                        records_processed: committed_records,
                        partial: stats,
                        source,
                    });
                }
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            created = stats.created,
            deduplicated = stats.deduplicated,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Address migration complete"
        );
        Ok(stats)
    }

    /// Process one batch inside a single transaction
    ///
    /// Any storage error propagates and drops the transaction, rolling back
    /// every write this batch made.
    async fn process_batch_live(&self, batch: &[Order]) -> Result<BatchTally, Error> {
        let mut tally = BatchTally::default();
        let mut tx = self.pool.begin().await?;

        for order in batch {
            let raw = order.raw_address.as_deref().unwrap_or_default();

            match resolve_with_retry(self.resolver.as_ref(), &self.policy, raw).await {
                Resolution::Unresolved => {
                    store::mark_failed(&mut tx, &order.guid).await?;
                    tally.failed += 1;
                }
                Resolution::Match(resolved) => {
                    let hash = content_hash(&resolved);

                    let address = match store::find_by_hash(
                        &mut tx,
                        &order.tenant_guid,
                        &hash,
                        &resolved.country_code,
                    )
                    .await?
                    {
                        Some(existing) => {
                            tally.deduplicated += 1;
                            existing
                        }
                        None => {
                            let candidate = CanonicalAddress::from_resolution(
                                &order.tenant_guid,
                                hash,
                                &resolved,
                            );
                            let (winner, inserted) =
                                store::insert_if_absent(&mut tx, &candidate).await?;
                            if inserted {
                                tally.created += 1;
                            } else {
                                // Concurrent writer won between lookup and insert
                                tally.deduplicated += 1;
                            }
                            winner
                        }
                    };

                    let update = LinkageUpdate {
                        canonical_address_guid: address.guid,
                        country_code: address.country_code.clone(),
                        snapshot: resolved,
                        status: ValidationStatus::Valid,
                    };
                    store::link_order(&mut tx, &order.guid, &update).await?;
                    tally.succeeded += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(tally)
    }

    /// Process one batch without writing anything
    ///
    /// Resolution, hashing and dedup lookups still run; `seen_keys` stands in
    /// for the inserts a live run would have made so created/deduplicated
    /// counters stay accurate across the whole run.
    async fn process_batch_dry(
        &self,
        batch: &[Order],
        seen_keys: &mut HashSet<(String, String, String)>,
    ) -> Result<BatchTally, Error> {
        let mut tally = BatchTally::default();
        let mut conn = self.pool.acquire().await?;

        for order in batch {
            let raw = order.raw_address.as_deref().unwrap_or_default();

            match resolve_with_retry(self.resolver.as_ref(), &self.policy, raw).await {
                Resolution::Unresolved => {
                    tally.failed += 1;
                }
                Resolution::Match(resolved) => {
                    let hash = content_hash(&resolved);
                    let key = (
                        order.tenant_guid.clone(),
                        resolved.country_code.clone(),
                        hash.clone(),
                    );

                    let exists = store::find_by_hash(
                        &mut conn,
                        &order.tenant_guid,
                        &hash,
                        &resolved.country_code,
                    )
                    .await?
                    .is_some();

                    if exists || !seen_keys.insert(key) {
                        tally.deduplicated += 1;
                    } else {
                        tally.created += 1;
                    }
                    tally.succeeded += 1;
                }
            }
        }

        Ok(tally)
    }
}

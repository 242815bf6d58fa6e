//! Canonical address store
//!
//! Persistence boundary of the migration engine. Every operation that writes
//! takes `&mut SqliteConnection` so it composes inside the caller's batch
//! transaction; nothing here commits on its own.
//!
//! The deduplication guarantee lives in [`insert_if_absent`]: it leans on the
//! UNIQUE (tenant_guid, country_code, content_hash) index with
//! `ON CONFLICT DO NOTHING`, so two writers racing on the same key both end
//! up holding the winner's row.

use crate::resolver::ResolvedAddress;
use chrono::{DateTime, Utc};
use drover_common::db::models::Order;
use drover_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Per-record validation outcome persisted on orders and addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "VALID",
            ValidationStatus::Failed => "FAILED",
        }
    }
}

/// Deduplicated canonical address entity
#[derive(Debug, Clone)]
pub struct CanonicalAddress {
    pub guid: Uuid,
    pub tenant_guid: String,
    pub content_hash: String,
    pub country_code: String,
    pub street: String,
    pub house_number: String,
    pub city: String,
    pub postal_code: String,
    pub formatted: String,
    pub latitude: f64,
    pub longitude: f64,
    pub validation_status: ValidationStatus,
    pub last_validated_at: DateTime<Utc>,
}

impl CanonicalAddress {
    /// Build a candidate entity from a resolution result
    pub fn from_resolution(
        tenant_guid: &str,
        content_hash: String,
        resolved: &ResolvedAddress,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            tenant_guid: tenant_guid.to_string(),
            content_hash,
            country_code: resolved.country_code.clone(),
            street: resolved.street.clone(),
            house_number: resolved.house_number.clone(),
            city: resolved.city.clone(),
            postal_code: resolved.postal_code.clone(),
            formatted: resolved.formatted.clone(),
            latitude: resolved.latitude,
            longitude: resolved.longitude,
            validation_status: ValidationStatus::Valid,
            last_validated_at: Utc::now(),
        }
    }
}

/// Mutation applied back to one order on success
#[derive(Debug, Clone)]
pub struct LinkageUpdate {
    pub canonical_address_guid: Uuid,
    pub country_code: String,
    /// Full resolution result, serialized into `address_snapshot` for audit
    pub snapshot: ResolvedAddress,
    pub status: ValidationStatus,
}

/// Columns selected for canonical address rows
const ADDRESS_COLUMNS: &str = "guid, tenant_guid, content_hash, country_code, street, \
     house_number, city, postal_code, formatted, latitude, longitude, \
     validation_status, last_validated_at";

type AddressRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    f64,
    f64,
    String,
    DateTime<Utc>,
);

fn address_from_row(row: AddressRow) -> Result<CanonicalAddress> {
    let guid = Uuid::parse_str(&row.0)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;
    let validation_status = match row.11.as_str() {
        "VALID" => ValidationStatus::Valid,
        "FAILED" => ValidationStatus::Failed,
        other => {
            return Err(Error::Internal(format!(
                "Unknown validation status in database: {}",
                other
            )))
        }
    };

    Ok(CanonicalAddress {
        guid,
        tenant_guid: row.1,
        content_hash: row.2,
        country_code: row.3,
        street: row.4,
        house_number: row.5,
        city: row.6,
        postal_code: row.7,
        formatted: row.8,
        latitude: row.9,
        longitude: row.10,
        validation_status,
        last_validated_at: row.12,
    })
}

/// Fetch the full candidate set: orders with no canonical link and a
/// non-blank raw address, in stable scan order.
///
/// The set is fixed up front; orders created after the scan are picked up by
/// the next run.
pub async fn fetch_candidates(pool: &SqlitePool) -> Result<Vec<Order>> {
    let rows: Vec<(
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    )> = sqlx::query_as(
        "SELECT guid, tenant_guid, raw_address, canonical_address_guid, \
                address_country, address_snapshot, address_status \
         FROM orders \
         WHERE canonical_address_guid IS NULL \
           AND raw_address IS NOT NULL \
           AND TRIM(raw_address) != '' \
         ORDER BY created_at, guid",
    )
    .fetch_all(pool)
    .await?;

    let candidates: Vec<Order> = rows
        .into_iter()
        .map(|row| Order {
            guid: row.0,
            tenant_guid: row.1,
            raw_address: row.2,
            canonical_address_guid: row.3,
            address_country: row.4,
            address_snapshot: row.5,
            address_status: row.6,
        })
        .collect();

    // The SQL predicate and the model-level candidate check must agree
    debug_assert!(candidates.iter().all(Order::is_migration_candidate));

    Ok(candidates)
}

/// Look up a canonical address by its deduplication key
///
/// Scoped to tenant and country in addition to the hash, so equal digests
/// never collide across tenants or jurisdictions.
pub async fn find_by_hash(
    conn: &mut SqliteConnection,
    tenant_guid: &str,
    content_hash: &str,
    country_code: &str,
) -> Result<Option<CanonicalAddress>> {
    let sql = format!(
        "SELECT {} FROM canonical_addresses \
         WHERE tenant_guid = ? AND content_hash = ? AND country_code = ?",
        ADDRESS_COLUMNS
    );
    let row: Option<AddressRow> = sqlx::query_as(&sql)
        .bind(tenant_guid)
        .bind(content_hash)
        .bind(country_code)
        .fetch_optional(conn)
        .await?;

    row.map(address_from_row).transpose()
}

/// Insert a canonical address unless one already exists for its key
///
/// Returns the persisted row (the winner's row when this caller lost a race)
/// and whether this caller performed the insert.
pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    candidate: &CanonicalAddress,
) -> Result<(CanonicalAddress, bool)> {
    let result = sqlx::query(
        "INSERT INTO canonical_addresses \
            (guid, tenant_guid, content_hash, country_code, street, house_number, \
             city, postal_code, formatted, latitude, longitude, \
             validation_status, last_validated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (tenant_guid, country_code, content_hash) DO NOTHING",
    )
    .bind(candidate.guid.to_string())
    .bind(&candidate.tenant_guid)
    .bind(&candidate.content_hash)
    .bind(&candidate.country_code)
    .bind(&candidate.street)
    .bind(&candidate.house_number)
    .bind(&candidate.city)
    .bind(&candidate.postal_code)
    .bind(&candidate.formatted)
    .bind(candidate.latitude)
    .bind(candidate.longitude)
    .bind(candidate.validation_status.as_str())
    .bind(candidate.last_validated_at)
    .execute(&mut *conn)
    .await?;

    let inserted = result.rows_affected() == 1;

    let winner = find_by_hash(
        conn,
        &candidate.tenant_guid,
        &candidate.content_hash,
        &candidate.country_code,
    )
    .await?
    .ok_or_else(|| {
        Error::Internal(format!(
            "Canonical address vanished after insert (tenant {}, hash {})",
            candidate.tenant_guid, candidate.content_hash
        ))
    })?;

    Ok((winner, inserted))
}

/// Write the linkage update for one order (exactly once per success)
pub async fn link_order(
    conn: &mut SqliteConnection,
    order_guid: &str,
    update: &LinkageUpdate,
) -> Result<()> {
    let snapshot_json = serde_json::to_string(&update.snapshot)
        .map_err(|e| Error::Internal(format!("Failed to serialize snapshot: {}", e)))?;

    sqlx::query(
        "UPDATE orders SET canonical_address_guid = ?, address_country = ?, \
                address_snapshot = ?, address_status = ?, \
                updated_at = CURRENT_TIMESTAMP \
         WHERE guid = ?",
    )
    .bind(update.canonical_address_guid.to_string())
    .bind(&update.country_code)
    .bind(&snapshot_json)
    .bind(update.status.as_str())
    .bind(order_guid)
    .execute(conn)
    .await?;

    Ok(())
}

/// Mark an order's address validation as failed (unresolvable input)
pub async fn mark_failed(conn: &mut SqliteConnection, order_guid: &str) -> Result<()> {
    sqlx::query(
        "UPDATE orders SET address_status = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE guid = ?",
    )
    .bind(ValidationStatus::Failed.as_str())
    .bind(order_guid)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Precision;
    use drover_common::db::create_schema;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    fn resolved() -> ResolvedAddress {
        ResolvedAddress {
            formatted: "123 Main St, New York, NY 10001, USA".to_string(),
            street: "Main St".to_string(),
            house_number: "123".to_string(),
            city: "New York".to_string(),
            postal_code: "10001".to_string(),
            country_code: "US".to_string(),
            latitude: 40.7506,
            longitude: -73.9972,
            precision: Precision::Rooftop,
        }
    }

    async fn insert_order(pool: &SqlitePool, guid: &str, tenant: &str, raw: Option<&str>) {
        sqlx::query("INSERT INTO orders (guid, tenant_guid, raw_address) VALUES (?, ?, ?)")
            .bind(guid)
            .bind(tenant)
            .bind(raw)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_candidates_filters_linked_and_blank() {
        let pool = setup_test_db().await;
        insert_order(&pool, "o-1", "t-1", Some("123 Main St")).await;
        insert_order(&pool, "o-2", "t-1", Some("   ")).await;
        insert_order(&pool, "o-3", "t-1", None).await;
        insert_order(&pool, "o-4", "t-1", Some("5 Elm St")).await;
        sqlx::query("UPDATE orders SET canonical_address_guid = 'a-1' WHERE guid = 'o-4'")
            .execute(&pool)
            .await
            .unwrap();

        let candidates = fetch_candidates(&pool).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].guid, "o-1");
        assert!(candidates.iter().all(Order::is_migration_candidate));
    }

    #[tokio::test]
    async fn insert_if_absent_creates_then_returns_winner() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = CanonicalAddress::from_resolution("t-1", "hash-1".to_string(), &resolved());
        let (winner, inserted) = insert_if_absent(&mut conn, &first).await.unwrap();
        assert!(inserted);
        assert_eq!(winner.guid, first.guid);

        // Second writer with the same key loses the race but gets the
        // winner's row back, not an error.
        let second = CanonicalAddress::from_resolution("t-1", "hash-1".to_string(), &resolved());
        let (winner2, inserted2) = insert_if_absent(&mut conn, &second).await.unwrap();
        assert!(!inserted2);
        assert_eq!(winner2.guid, first.guid);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM canonical_addresses")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn find_by_hash_scopes_tenant_and_country() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let address = CanonicalAddress::from_resolution("t-1", "hash-1".to_string(), &resolved());
        insert_if_absent(&mut conn, &address).await.unwrap();

        assert!(find_by_hash(&mut conn, "t-1", "hash-1", "US")
            .await
            .unwrap()
            .is_some());
        assert!(find_by_hash(&mut conn, "t-2", "hash-1", "US")
            .await
            .unwrap()
            .is_none());
        assert!(find_by_hash(&mut conn, "t-1", "hash-1", "DE")
            .await
            .unwrap()
            .is_none());
        assert!(find_by_hash(&mut conn, "t-1", "hash-2", "US")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn link_order_writes_snapshot_and_status() {
        let pool = setup_test_db().await;
        insert_order(&pool, "o-1", "t-1", Some("123 Main St")).await;
        let mut conn = pool.acquire().await.unwrap();

        let address = CanonicalAddress::from_resolution("t-1", "hash-1".to_string(), &resolved());
        let (winner, _) = insert_if_absent(&mut conn, &address).await.unwrap();

        let update = LinkageUpdate {
            canonical_address_guid: winner.guid,
            country_code: winner.country_code.clone(),
            snapshot: resolved(),
            status: ValidationStatus::Valid,
        };
        link_order(&mut conn, "o-1", &update).await.unwrap();

        let row: (Option<String>, Option<String>, Option<String>, Option<String>) =
            sqlx::query_as(
                "SELECT canonical_address_guid, address_country, address_snapshot, \
                        address_status FROM orders WHERE guid = 'o-1'",
            )
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(row.0.as_deref(), Some(winner.guid.to_string().as_str()));
        assert_eq!(row.1.as_deref(), Some("US"));
        assert_eq!(row.3.as_deref(), Some("VALID"));

        let snapshot: ResolvedAddress = serde_json::from_str(&row.2.unwrap()).unwrap();
        assert_eq!(snapshot, resolved());
    }

    #[tokio::test]
    async fn mark_failed_sets_status_only() {
        let pool = setup_test_db().await;
        insert_order(&pool, "o-1", "t-1", Some("FAIL_PERMANENT somewhere")).await;
        let mut conn = pool.acquire().await.unwrap();

        mark_failed(&mut conn, "o-1").await.unwrap();

        let row: (Option<String>, Option<String>) = sqlx::query_as(
            "SELECT address_status, canonical_address_guid FROM orders WHERE guid = 'o-1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.0.as_deref(), Some("FAILED"));
        assert!(row.1.is_none());
    }
}

//! Month-scoped lead number allocation.
//!
//! The sequence is scoped to the creation month across *all* leads, so it
//! cannot live inside one aggregate's invariants. The allocator hands out the
//! next number before `OpenLead` is dispatched; `observe` feeds committed
//! numbers back in (replay, rebuilds) so a restarted process never reissues
//! one it has seen.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Utc};

use forgecrm_core::DomainResult;
use forgecrm_pipeline::LeadNumber;

pub trait LeadNumberAllocator: Send + Sync {
    /// Allocate the next number for the month containing `now`.
    fn allocate(&self, now: DateTime<Utc>) -> DomainResult<LeadNumber>;

    /// Record an already-committed number (replay/rebuild path).
    fn observe(&self, number: LeadNumber);
}

/// Mutex-serialized in-memory allocator.
#[derive(Debug, Default)]
pub struct InMemoryLeadNumberAllocator {
    // (year, month) -> highest sequence handed out or observed.
    counters: Mutex<HashMap<(i32, u32), u32>>,
}

impl InMemoryLeadNumberAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeadNumberAllocator for InMemoryLeadNumberAllocator {
    fn allocate(&self, now: DateTime<Utc>) -> DomainResult<LeadNumber> {
        let key = (now.year(), now.month());
        let mut counters = self.counters.lock().expect("allocator lock poisoned");
        let next = counters.get(&key).copied().unwrap_or(0) + 1;
        let number = LeadNumber::new(key.0, key.1, next)?;
        counters.insert(key, next);
        Ok(number)
    }

    fn observe(&self, number: LeadNumber) {
        let key = (number.year(), number.month());
        let mut counters = self.counters.lock().expect("allocator lock poisoned");
        let entry = counters.entry(key).or_insert(0);
        if number.sequence() > *entry {
            *entry = number.sequence();
        }
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresLeadNumberAllocator;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use forgecrm_core::DomainError;
    use sqlx::{PgPool, Row};
    use std::sync::Arc;

    const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS lead_numbers (
        year     INT NOT NULL,
        month    INT NOT NULL,
        sequence INT NOT NULL,
        PRIMARY KEY (year, month)
    )
    "#;

    /// Postgres-backed allocator.
    ///
    /// The upsert-returning statement makes concurrent allocators serialize on
    /// the row lock, so two processes can never hand out the same number.
    #[derive(Debug, Clone)]
    pub struct PostgresLeadNumberAllocator {
        pool: Arc<PgPool>,
    }

    impl PostgresLeadNumberAllocator {
        pub fn new(pool: PgPool) -> Self {
            Self {
                pool: Arc::new(pool),
            }
        }

        pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
            sqlx::query(CREATE_TABLE).execute(&*self.pool).await?;
            Ok(())
        }

        async fn allocate_async(&self, now: DateTime<Utc>) -> DomainResult<LeadNumber> {
            let row = sqlx::query(
                r#"
                INSERT INTO lead_numbers (year, month, sequence)
                VALUES ($1, $2, 1)
                ON CONFLICT (year, month)
                DO UPDATE SET sequence = lead_numbers.sequence + 1
                RETURNING sequence
                "#,
            )
            .bind(now.year())
            .bind(now.month() as i32)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| DomainError::conflict(format!("lead number allocation failed: {e}")))?;

            let sequence: i32 = row.get("sequence");
            LeadNumber::new(now.year(), now.month(), sequence as u32)
        }

        async fn observe_async(&self, number: LeadNumber) {
            let result = sqlx::query(
                r#"
                INSERT INTO lead_numbers (year, month, sequence)
                VALUES ($1, $2, $3)
                ON CONFLICT (year, month)
                DO UPDATE SET sequence = GREATEST(lead_numbers.sequence, EXCLUDED.sequence)
                "#,
            )
            .bind(number.year())
            .bind(number.month() as i32)
            .bind(number.sequence() as i32)
            .execute(&*self.pool)
            .await;

            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to observe lead number");
            }
        }
    }

    impl LeadNumberAllocator for PostgresLeadNumberAllocator {
        fn allocate(&self, now: DateTime<Utc>) -> DomainResult<LeadNumber> {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(self.allocate_async(now))
            })
        }

        fn observe(&self, number: LeadNumber) {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(self.observe_async(number))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn sequences_are_monotonic_within_a_month() {
        let allocator = InMemoryLeadNumberAllocator::new();
        let a = allocator.allocate(at(2026, 8)).unwrap();
        let b = allocator.allocate(at(2026, 8)).unwrap();
        assert_eq!(a.to_string(), "LEAD-202608-0001");
        assert_eq!(b.to_string(), "LEAD-202608-0002");
        assert!(b > a);
    }

    #[test]
    fn sequences_restart_each_month() {
        let allocator = InMemoryLeadNumberAllocator::new();
        allocator.allocate(at(2026, 8)).unwrap();
        let first_of_september = allocator.allocate(at(2026, 9)).unwrap();
        assert_eq!(first_of_september.sequence(), 1);
    }

    #[test]
    fn observe_seeds_the_counter_past_replayed_numbers() {
        let allocator = InMemoryLeadNumberAllocator::new();
        allocator.observe(LeadNumber::new(2026, 8, 41).unwrap());
        allocator.observe(LeadNumber::new(2026, 8, 7).unwrap());

        let next = allocator.allocate(at(2026, 8)).unwrap();
        assert_eq!(next.sequence(), 42);
    }
}

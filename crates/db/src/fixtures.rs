//! Demo seed data for local development and walkthroughs.

use tracing::info;

use crate::repositories::RepositoryError;
use crate::DbPool;

const DEMO_SEED: &str = include_str!("../fixtures/demo_seed.sql");

/// Applies the demo seed on top of an empty, migrated database. Running it
/// twice fails on the fixed primary keys, which is the intended guard.
pub async fn apply_demo_seed(pool: &DbPool) -> Result<(), RepositoryError> {
    sqlx::raw_sql(DEMO_SEED).execute(pool).await?;
    info!(event_name = "fixtures.demo_seed.applied", "demo seed applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::apply_demo_seed;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    #[tokio::test]
    async fn demo_seed_populates_every_table_once() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        apply_demo_seed(&pool).await.expect("seed");

        for (table, expected) in [
            ("groomers", 3i64),
            ("clients", 3),
            ("pets", 3),
            ("weekly_schedules", 6),
            ("bookings", 3),
            ("messages", 3),
        ] {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {table}"))
                .fetch_one(&pool)
                .await
                .expect("count");
            assert_eq!(row.get::<i64, _>("count"), expected, "table {table}");
        }

        assert!(apply_demo_seed(&pool).await.is_err(), "reapplying must refuse");
    }
}

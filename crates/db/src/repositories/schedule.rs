use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::Row;

use barkline_core::domain::{Groomer, GroomerId};

use crate::repositories::{parse_date, RepositoryError, ScheduleRepository};
use crate::DbPool;

pub struct SqlScheduleRepository {
    pool: DbPool,
}

impl SqlScheduleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Day columns in week order, paired with their offset back from the
/// week-ending Saturday.
const DAY_COLUMNS: [(&str, i64); 7] = [
    ("sun_start", -6),
    ("mon_start", -5),
    ("tue_start", -4),
    ("wed_start", -3),
    ("thu_start", -2),
    ("fri_start", -1),
    ("sat_start", 0),
];

#[async_trait]
impl ScheduleRepository for SqlScheduleRepository {
    async fn active_groomers(&self) -> Result<Vec<Groomer>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, note FROM groomers WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Groomer {
                id: GroomerId(row.get::<i64, _>("id")),
                name: row.get::<String, _>("name"),
                note: row.get::<Option<String>, _>("note"),
            })
            .collect())
    }

    async fn closures_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT closed_on FROM closures WHERE closed_on >= ?1 AND closed_on <= ?2",
        )
        .bind(start.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| parse_date(&row.get::<String, _>("closed_on"))).collect()
    }

    async fn blocked_between(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT blocked_on FROM blocked_dates
             WHERE groomer_id = ?1 AND blocked_on >= ?2 AND blocked_on <= ?3",
        )
        .bind(groomer_id.0)
        .bind(start.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| parse_date(&row.get::<String, _>("blocked_on"))).collect()
    }

    async fn working_days(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RepositoryError> {
        // Any week whose Saturday lands in [start, end + 6d] can contribute
        // days inside the range.
        let last_week_ending = end + Duration::days(6);
        let rows = sqlx::query(
            "SELECT week_ending, sun_start, mon_start, tue_start, wed_start,
                    thu_start, fri_start, sat_start
             FROM weekly_schedules
             WHERE groomer_id = ?1 AND week_ending >= ?2 AND week_ending <= ?3",
        )
        .bind(groomer_id.0)
        .bind(start.to_string())
        .bind(last_week_ending.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut days = Vec::new();
        for row in &rows {
            let week_ending = parse_date(&row.get::<String, _>("week_ending"))?;
            for (column, offset) in DAY_COLUMNS {
                if row.get::<Option<String>, _>(column).is_none() {
                    continue;
                }
                let date = week_ending + Duration::days(offset);
                if date >= start && date <= end {
                    days.push(date);
                }
            }
        }
        days.sort();
        Ok(days)
    }
}

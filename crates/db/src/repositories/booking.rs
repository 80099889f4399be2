use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;

use barkline_core::domain::{Booking, ClientId, GroomerId, PetId, ServiceKind};

use crate::repositories::{
    decode_minutes, parse_date, AppointmentRow, BookingRepository, NewBooking, RepositoryError,
};
use crate::DbPool;

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_booking(row: &sqlx::sqlite::SqliteRow) -> Result<Booking, RepositoryError> {
    let end_min = match row.get::<Option<i64>, _>("end_min") {
        Some(value) => Some(decode_minutes(value, "end_min")?),
        None => None,
    };
    Ok(Booking::new(
        parse_date(&row.get::<String, _>("booked_on"))?,
        decode_minutes(row.get::<i64, _>("start_min"), "start_min")?,
        end_min,
        GroomerId(row.get::<i64, _>("groomer_id")),
        row.get::<String, _>("pet_name"),
        row.get::<String, _>("client_last_name"),
        row.get::<Option<String>, _>("pet_size"),
        ServiceKind::from_label(&row.get::<String, _>("service")),
    ))
}

fn row_to_appointment(row: &sqlx::sqlite::SqliteRow) -> Result<AppointmentRow, RepositoryError> {
    Ok(AppointmentRow {
        date: parse_date(&row.get::<String, _>("booked_on"))?,
        start_min: decode_minutes(row.get::<i64, _>("start_min"), "start_min")?,
        pet_id: PetId(row.get::<i64, _>("pet_id")),
        pet_name: row.get::<String, _>("pet_name"),
        groomer_id: GroomerId(row.get::<i64, _>("groomer_id")),
        groomer_name: row.get::<String, _>("groomer_name"),
        service: ServiceKind::from_label(&row.get::<String, _>("service")),
    })
}

#[async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn for_groomer_between(
        &self,
        groomer_id: GroomerId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT b.booked_on, b.start_min, b.end_min, b.groomer_id, b.service,
                    p.name AS pet_name, p.size_code AS pet_size,
                    c.last_name AS client_last_name
             FROM bookings b
             JOIN pets p ON p.id = b.pet_id
             JOIN clients c ON c.id = p.client_id
             WHERE b.groomer_id = ?1
               AND b.deleted = 0 AND b.waitlist = 0
               AND b.booked_on >= ?2 AND b.booked_on <= ?3
             ORDER BY b.booked_on, b.start_min",
        )
        .bind(groomer_id.0)
        .bind(start.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn upcoming_for_client(
        &self,
        client_id: ClientId,
        from: NaiveDate,
        limit: u32,
    ) -> Result<Vec<AppointmentRow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT b.booked_on, b.start_min, b.pet_id, b.groomer_id, b.service,
                    p.name AS pet_name, g.name AS groomer_name
             FROM bookings b
             JOIN pets p ON p.id = b.pet_id
             JOIN groomers g ON g.id = b.groomer_id
             WHERE p.client_id = ?1
               AND b.deleted = 0 AND b.waitlist = 0
               AND b.booked_on >= ?2
             ORDER BY b.booked_on, b.start_min
             LIMIT ?3",
        )
        .bind(client_id.0)
        .bind(from.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_appointment).collect()
    }

    async fn future_count(
        &self,
        client_id: ClientId,
        from: NaiveDate,
    ) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count
             FROM bookings b
             JOIN pets p ON p.id = b.pet_id
             WHERE p.client_id = ?1
               AND b.deleted = 0 AND b.waitlist = 0
               AND b.booked_on >= ?2",
        )
        .bind(client_id.0)
        .bind(from.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn history_for_client(
        &self,
        client_id: ClientId,
        before: NaiveDate,
        limit: u32,
    ) -> Result<Vec<AppointmentRow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT b.booked_on, b.start_min, b.pet_id, b.groomer_id, b.service,
                    p.name AS pet_name, g.name AS groomer_name
             FROM bookings b
             JOIN pets p ON p.id = b.pet_id
             JOIN groomers g ON g.id = b.groomer_id
             WHERE p.client_id = ?1
               AND b.deleted = 0 AND b.waitlist = 0
               AND b.booked_on < ?2
             ORDER BY b.booked_on DESC, b.start_min DESC
             LIMIT ?3",
        )
        .bind(client_id.0)
        .bind(before.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_appointment).collect()
    }

    async fn insert(&self, booking: &NewBooking) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO bookings (groomer_id, pet_id, booked_on, start_min, end_min, service)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(booking.groomer_id.0)
        .bind(booking.pet_id.0)
        .bind(booking.date.to_string())
        .bind(i64::from(booking.start_min))
        .bind(booking.end_min.map(i64::from))
        .bind(booking.service.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

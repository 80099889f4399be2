use async_trait::async_trait;
use sqlx::Row;

use barkline_core::domain::{
    normalize_phone, Client, ClientId, ClientStats, NoteEntry, Pet, PetId,
};

use crate::repositories::{parse_date, ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Client {
    Client {
        id: ClientId(row.get::<i64, _>("id")),
        first_name: row.get::<String, _>("first_name"),
        last_name: row.get::<String, _>("last_name"),
        phone: row.get::<String, _>("phone"),
        warning: row.get::<Option<String>, _>("warning"),
        inactive: row.get::<i64, _>("inactive") != 0,
    }
}

const CLIENT_COLUMNS: &str = "id, first_name, last_name, phone, warning, inactive";

#[async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_client))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Client>, RepositoryError> {
        let target = normalize_phone(phone);
        if target.is_empty() {
            return Ok(None);
        }

        // Stored phones come from the point-of-sale in mixed formats, so
        // normalization has to happen on this side. Client counts are
        // salon-scale.
        let rows =
            sqlx::query(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE phone <> ''"))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(row_to_client)
            .find(|client| normalize_phone(&client.phone) == target))
    }

    async fn search(&self, query: &str) -> Result<Option<Client>, RepositoryError> {
        let needle = format!("%{}%", query.trim());

        let by_name = sqlx::query(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients
             WHERE (first_name || ' ' || last_name) LIKE ?1
             ORDER BY inactive, id
             LIMIT 1"
        ))
        .bind(&needle)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = by_name {
            return Ok(Some(row_to_client(&row)));
        }

        let by_pet = sqlx::query(&format!(
            "SELECT {} FROM clients c
             JOIN pets p ON p.client_id = c.id
             WHERE p.name LIKE ?1
             ORDER BY c.inactive, c.id
             LIMIT 1",
            CLIENT_COLUMNS
                .split(", ")
                .map(|col| format!("c.{col}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(&needle)
        .fetch_optional(&self.pool)
        .await?;
        Ok(by_pet.as_ref().map(row_to_client))
    }

    async fn pets_for(&self, id: ClientId) -> Result<Vec<Pet>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, client_id, name, breed, size_code, coat_code, birthdate
             FROM pets WHERE client_id = ?1 ORDER BY id",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let birthdate = match row.get::<Option<String>, _>("birthdate") {
                    Some(raw) => Some(parse_date(&raw)?),
                    None => None,
                };
                Ok(Pet {
                    id: PetId(row.get::<i64, _>("id")),
                    client_id: ClientId(row.get::<i64, _>("client_id")),
                    name: row.get::<String, _>("name"),
                    breed: row.get::<Option<String>, _>("breed"),
                    size_code: row.get::<Option<String>, _>("size_code"),
                    coat_code: row.get::<Option<String>, _>("coat_code"),
                    birthdate,
                })
            })
            .collect()
    }

    async fn notes_for(
        &self,
        id: ClientId,
        limit: u32,
    ) -> Result<Vec<NoteEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT noted_on, subject, author, body
             FROM client_notes
             WHERE client_id = ?1
             ORDER BY noted_on DESC, id DESC
             LIMIT ?2",
        )
        .bind(id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let noted_on = match row.get::<Option<String>, _>("noted_on") {
                    Some(raw) => Some(parse_date(&raw)?),
                    None => None,
                };
                Ok(NoteEntry {
                    noted_on,
                    subject: row.get::<Option<String>, _>("subject"),
                    author: row.get::<Option<String>, _>("author"),
                    body: row.get::<String, _>("body"),
                })
            })
            .collect()
    }

    async fn stats_for(&self, id: ClientId) -> Result<Option<ClientStats>, RepositoryError> {
        let row = sqlx::query(
            "SELECT client_id, avg_cadence_days, preferred_day, preferred_time, visits_12mo
             FROM client_stats WHERE client_id = ?1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ClientStats {
            client_id: ClientId(row.get::<i64, _>("client_id")),
            avg_cadence_days: row.get::<Option<f64>, _>("avg_cadence_days"),
            preferred_day: row.get::<Option<String>, _>("preferred_day"),
            preferred_time: row.get::<Option<String>, _>("preferred_time"),
            visits_12mo: row.get::<Option<i64>, _>("visits_12mo"),
        }))
    }
}

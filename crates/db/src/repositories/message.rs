use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use barkline_core::domain::{ClientId, ConversationLine, InboundMessage, MessageId};

use crate::repositories::{parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_inbound(row: &sqlx::sqlite::SqliteRow) -> Result<InboundMessage, RepositoryError> {
    Ok(InboundMessage {
        id: MessageId(row.get::<i64, _>("id")),
        client_id: row.get::<Option<i64>, _>("client_id").map(ClientId),
        phone: row.get::<String, _>("phone"),
        body: row.get::<String, _>("body"),
        received_at: parse_timestamp(&row.get::<String, _>("received_at"))?,
    })
}

#[async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn max_message_id(&self) -> Result<Option<MessageId>, RepositoryError> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<Option<i64>, _>("max_id").map(MessageId))
    }

    async fn unhandled_after(
        &self,
        after: MessageId,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, client_id, phone, body, received_at
             FROM messages
             WHERE id > ?1 AND outbound = 0 AND handled = 0
             ORDER BY id ASC
             LIMIT ?2",
        )
        .bind(after.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_inbound).collect()
    }

    async fn mark_handled(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE messages SET handled = 1 WHERE id = ?1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn conversation_tail(
        &self,
        client_id: ClientId,
        limit: u32,
    ) -> Result<Vec<ConversationLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT outbound, body
             FROM messages
             WHERE client_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )
        .bind(client_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        // fetched newest-first; callers want chronological order
        let mut lines: Vec<ConversationLine> = rows
            .iter()
            .map(|row| ConversationLine {
                from_business: row.get::<i64, _>("outbound") != 0,
                body: row.get::<String, _>("body"),
            })
            .collect();
        lines.reverse();
        Ok(lines)
    }

    async fn record_assistant_reply(
        &self,
        client_id: Option<ClientId>,
        phone: &str,
        body: &str,
    ) -> Result<MessageId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO messages (client_id, phone, body, outbound, handled, sent_by_assistant, received_at)
             VALUES (?1, ?2, ?3, 1, 1, 1, ?4)",
        )
        .bind(client_id.map(|id| id.0))
        .bind(phone)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(MessageId(result.last_insert_rowid()))
    }
}

#[cfg(test)]
mod tests {
    use barkline_core::domain::{ClientId, MessageId};

    use super::SqlMessageRepository;
    use crate::migrations::run_pending;
    use crate::repositories::MessageRepository;
    use crate::connect_with_settings;

    async fn repo() -> SqlMessageRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        sqlx::query("INSERT INTO clients (id, first_name, last_name, phone) VALUES (42, 'Dana', 'Harper', '6155550101')")
            .execute(&pool)
            .await
            .expect("seed client");
        SqlMessageRepository::new(pool)
    }

    async fn insert_inbound(repo: &SqlMessageRepository, body: &str) -> i64 {
        sqlx::query(
            "INSERT INTO messages (client_id, phone, body, outbound, handled) VALUES (42, '6155550101', ?1, 0, 0)",
        )
        .bind(body)
        .execute(&repo.pool)
        .await
        .expect("insert")
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn watermark_queries_see_only_new_unhandled_inbound() {
        let repo = repo().await;
        let first = insert_inbound(&repo, "first").await;
        let second = insert_inbound(&repo, "second").await;

        assert_eq!(repo.max_message_id().await.unwrap(), Some(MessageId(second)));

        let batch = repo.unhandled_after(MessageId(first), 20).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "second");

        assert!(repo.mark_handled(MessageId(second)).await.unwrap());
        let batch = repo.unhandled_after(MessageId(first), 20).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn conversation_tail_is_chronological_and_capped() {
        let repo = repo().await;
        for n in 0..5 {
            insert_inbound(&repo, &format!("msg {n}")).await;
        }
        repo.record_assistant_reply(Some(ClientId(42)), "6155550101", "our reply")
            .await
            .unwrap();

        let tail = repo.conversation_tail(ClientId(42), 3).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[2].body, "our reply");
        assert!(tail[2].from_business);
        assert_eq!(tail[0].body, "msg 3");
    }

    #[tokio::test]
    async fn assistant_replies_are_marked_handled_and_outbound() {
        let repo = repo().await;
        let id = repo
            .record_assistant_reply(Some(ClientId(42)), "6155550101", "see you Friday!")
            .await
            .unwrap();

        // outbound rows never show up in the inbound poll
        let batch = repo.unhandled_after(MessageId(0), 20).await.unwrap();
        assert!(batch.iter().all(|message| message.id != id));
    }
}

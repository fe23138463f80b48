// SQLite SnapshotStore Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use stepwise_core::domain::{Direction, QueueInstance, TaskContext};
use stepwise_core::error::Result;
use stepwise_core::port::SnapshotStore;
use tracing::{debug, warn};

/// Active-queue snapshot kept in a `queue_instances` table.
///
/// A save clears and refills the table in one transaction, so readers see
/// either the previous snapshot or the new one.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> std::result::Result<QueueInstance, String> {
    let instance_id: String = row.try_get("instance_id").map_err(|e| e.to_string())?;
    let definition_id: String = row.try_get("definition_id").map_err(|e| e.to_string())?;
    let raw_context: String = row.try_get("context").map_err(|e| e.to_string())?;

    let value = serde_json::from_str(&raw_context).map_err(|e| e.to_string())?;
    let context = TaskContext::from_value(value).map_err(|e| e.to_string())?;

    let mut instance = QueueInstance::new(instance_id, definition_id, context);
    instance.cursor = row.try_get("cursor_pos").map_err(|e| e.to_string())?;
    instance.step_done = row.try_get("step_done").map_err(|e| e.to_string())?;
    let backward: bool = row.try_get("backward").map_err(|e| e.to_string())?;
    instance.direction = if backward {
        Direction::Backward
    } else {
        Direction::Forward
    };
    Ok(instance)
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load_snapshot(&self) -> Result<Vec<QueueInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT position, instance_id, definition_id, context, cursor_pos, step_done, backward
            FROM queue_instances
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_row(row) {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    let position: i64 = row.try_get("position").unwrap_or(-1);
                    warn!(position = position, error = %e, "Skipping malformed snapshot row");
                }
            }
        }
        Ok(instances)
    }

    async fn save_snapshot(&self, instances: &[QueueInstance]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM queue_instances")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (position, instance) in instances.iter().enumerate() {
            let context = serde_json::to_string(&instance.context)?;
            sqlx::query(
                r#"
                INSERT INTO queue_instances (
                    position, instance_id, definition_id, context,
                    cursor_pos, step_done, backward
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position as i64)
            .bind(&instance.instance_id)
            .bind(&instance.definition_id)
            .bind(context)
            .bind(instance.cursor)
            .bind(instance.step_done)
            .bind(instance.direction.is_backward())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(instances = instances.len(), "Snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use stepwise_core::AppError;

    async fn store() -> SqliteSnapshotStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteSnapshotStore::new(pool)
    }

    fn instance(id: &str, cursor: i64) -> QueueInstance {
        let mut context = TaskContext::new();
        context.insert("order", id);
        let mut instance = QueueInstance::new(id, "QA", context);
        instance.cursor = cursor;
        instance
    }

    #[tokio::test]
    async fn test_empty_table_is_empty_set() {
        let store = store().await;
        assert!(store.load_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let store = store().await;
        store
            .save_snapshot(&[instance("a", 0), instance("b", 1)])
            .await
            .unwrap();

        let mut reversed = instance("c", 2);
        reversed.direction = Direction::Backward;
        reversed.step_done = true;
        store.save_snapshot(&[reversed.clone(), instance("a", 1)]).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], reversed);
        assert_eq!(loaded[1].instance_id, "a");
        assert_eq!(loaded[1].cursor, 1);
        assert_eq!(loaded[1].context.get_as::<String>("order"), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_context_row_skipped() {
        let store = store().await;
        store.save_snapshot(&[instance("good", 0)]).await.unwrap();
        sqlx::query(
            "INSERT INTO queue_instances (position, instance_id, definition_id, context) VALUES (5, 'bad', 'QA', 'not json')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].instance_id, "good");
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_snapshot() {
        let store = store().await;
        store.save_snapshot(&[instance("keep", 0)]).await.unwrap();

        // Duplicate instance ids violate the unique constraint mid-transaction
        let err = store
            .save_snapshot(&[instance("dup", 0), instance("dup", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));

        let loaded = store.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].instance_id, "keep");
    }
}

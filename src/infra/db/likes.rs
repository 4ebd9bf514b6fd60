use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::{
    application::repos::{LikeTransaction, LikesRepo, RepoError},
    domain::likes::{ActorId, ItemId},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ItemCountRow {
    item_id: i64,
    like_count: i64,
}

fn item_from_row(raw: i64) -> Result<ItemId, RepoError> {
    ItemId::new(raw).map_err(|err| RepoError::Integrity {
        message: err.to_string(),
    })
}

#[async_trait]
impl LikesRepo for PostgresRepositories {
    async fn count_likes(&self, item: ItemId) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE item_id = $1")
            .bind(item.get())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn liked_items(&self, actor: ActorId) -> Result<Vec<ItemId>, RepoError> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT item_id FROM likes WHERE actor_id = $1 ORDER BY item_id")
                .bind(actor.get())
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        rows.into_iter().map(item_from_row).collect()
    }

    async fn count_likes_grouped(&self, items: &[ItemId]) -> Result<Vec<(ItemId, u64)>, RepoError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = items.iter().map(|item| item.get()).collect();

        let rows = sqlx::query_as::<_, ItemCountRow>(
            r#"
            SELECT item_id, COUNT(*) AS like_count
            FROM likes
            WHERE item_id = ANY($1)
            GROUP BY item_id
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| Ok((item_from_row(row.item_id)?, Self::convert_count(row.like_count)?)))
            .collect()
    }

    async fn begin(&self) -> Result<Box<dyn LikeTransaction>, RepoError> {
        let tx = PostgresRepositories::begin(self)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(PgLikeTransaction { tx }))
    }
}

/// Like mutations inside one Postgres transaction.
///
/// Dropping it without [`LikeTransaction::commit`] rolls the transaction back.
pub struct PgLikeTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LikeTransaction for PgLikeTransaction {
    async fn insert_like(&mut self, item: ItemId, actor: ActorId) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (item_id, actor_id)
            VALUES ($1, $2)
            ON CONFLICT (item_id, actor_id) DO NOTHING
            "#,
        )
        .bind(item.get())
        .bind(actor.get())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_like(&mut self, item: ItemId, actor: ActorId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM likes WHERE item_id = $1 AND actor_id = $2")
            .bind(item.get())
            .bind(actor.get())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

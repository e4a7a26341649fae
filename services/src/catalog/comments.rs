use super::{Catalog, CatalogError, CatalogResult, UNKNOWN_USERNAME};
use crate::database::{CommentRecord, SqlStorage};
use crate::users::storage::UserStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_COMMENT_CHARS: usize = 5000;

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDto {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl<S: SqlStorage, U: UserStorage> Catalog<'_, S, U> {
    /// Oldest first.
    pub async fn list_comments(&self, inventory_id: Uuid) -> CatalogResult<Vec<CommentDto>> {
        self.inventory(inventory_id).await?;
        let comments = self.sql.comments_list(inventory_id).await?;
        let author_ids: Vec<Uuid> = comments.iter().map(|c| c.author_id).collect();
        let usernames = self.users.usernames(&author_ids).await?;

        Ok(comments
            .into_iter()
            .map(|comment| CommentDto {
                author_username: usernames
                    .get(&comment.author_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_USERNAME.to_owned()),
                id: comment.id,
                inventory_id: comment.inventory_id,
                author_id: comment.author_id,
                content: comment.content,
                created_at: comment.created_at,
            })
            .collect())
    }

    #[tracing::instrument(skip_all, fields(inventory_id = %inventory_id, user_id = %user_id))]
    pub async fn add_comment(
        &self,
        user_id: Uuid,
        inventory_id: Uuid,
        content: &str,
    ) -> CatalogResult<CommentDto> {
        self.inventory(inventory_id).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(CatalogError::validation("Comment cannot be empty"));
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(CatalogError::validation(format!(
                "Comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }

        let comment = CommentRecord {
            id: Uuid::new_v4(),
            inventory_id,
            author_id: user_id,
            content: content.to_owned(),
            created_at: Utc::now(),
        };
        self.sql.comments_insert(&comment).await?;

        Ok(CommentDto {
            author_username: self.username(user_id).await?,
            id: comment.id,
            inventory_id,
            author_id: user_id,
            content: comment.content,
            created_at: comment.created_at,
        })
    }
}

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use riskgate_core::domain::folder::{Folder, FolderId};

use super::{decode_id, decode_timestamp, FolderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFolderRepository {
    pool: DbPool,
}

impl SqlFolderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_folder(row: &SqliteRow) -> Result<Folder, RepositoryError> {
    let id: String = row.try_get("id")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Folder {
        id: decode_id("folder.id", &id)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        parent_id: parent_id
            .as_deref()
            .map(|raw| decode_id::<FolderId>("folder.parent_id", raw))
            .transpose()?,
        builtin: row.try_get("builtin")?,
        created_at: decode_timestamp("folder.created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl FolderRepository for SqlFolderRepository {
    async fn find_by_id(&self, id: FolderId) -> Result<Option<Folder>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, parent_id, builtin, created_at
             FROM folder WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_folder).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Folder>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, parent_id, builtin, created_at
             FROM folder WHERE name = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_folder).transpose()
    }

    async fn list(&self) -> Result<Vec<Folder>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, description, parent_id, builtin, created_at
             FROM folder ORDER BY created_at ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_folder).collect()
    }

    async fn save(&self, folder: Folder) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO folder (id, name, description, parent_id, builtin, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 parent_id = excluded.parent_id",
        )
        .bind(folder.id.to_string())
        .bind(&folder.name)
        .bind(&folder.description)
        .bind(folder.parent_id.map(|id| id.to_string()))
        .bind(folder.builtin)
        .bind(folder.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

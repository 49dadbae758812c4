use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use riskgate_core::approvals::ApproverCandidate;
use riskgate_core::authz::{FolderGrant, Identity, Role};
use riskgate_core::domain::directory::{ApiToken, ApiTokenId, GroupId, User, UserGroup, UserId};

use super::{decode_id, decode_timestamp, DirectoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<FolderGrant>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT g.folder_id, g.role, g.recursive
             FROM user_group g
             JOIN user_group_member m ON m.group_id = g.id
             WHERE m.user_id = ?
             ORDER BY g.name ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FolderGrant, RepositoryError> {
                let folder_id: String = row.try_get("folder_id")?;
                let role: String = row.try_get("role")?;
                Ok(FolderGrant {
                    folder_id: decode_id("user_group.folder_id", &folder_id)?,
                    role: decode_role(&role)?,
                    recursive: row.try_get("recursive")?,
                })
            })
            .collect()
    }
}

fn decode_role(raw: &str) -> Result<Role, RepositoryError> {
    raw.parse::<Role>().map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: decode_id("app_user.id", &id)?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_active: row.try_get("is_active")?,
        is_superuser: row.try_get("is_superuser")?,
        created_at: decode_timestamp("app_user.created_at", &created_at)?,
    })
}

fn row_to_group(row: &SqliteRow) -> Result<UserGroup, RepositoryError> {
    let id: String = row.try_get("id")?;
    let folder_id: String = row.try_get("folder_id")?;
    let role: String = row.try_get("role")?;

    Ok(UserGroup {
        id: decode_id("user_group.id", &id)?,
        name: row.try_get("name")?,
        folder_id: decode_id("user_group.folder_id", &folder_id)?,
        role: decode_role(&role)?,
        recursive: row.try_get("recursive")?,
        builtin: row.try_get("builtin")?,
    })
}

fn row_to_token(row: &SqliteRow) -> Result<ApiToken, RepositoryError> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let created_at: String = row.try_get("created_at")?;
    let expires_at: Option<String> = row.try_get("expires_at")?;

    Ok(ApiToken {
        id: decode_id::<ApiTokenId>("api_token.id", &id)?,
        user_id: decode_id("api_token.user_id", &user_id)?,
        token_hash: row.try_get("token_hash")?,
        label: row.try_get("label")?,
        created_at: decode_timestamp("api_token.created_at", &created_at)?,
        expires_at: expires_at
            .as_deref()
            .map(|raw| decode_timestamp("api_token.expires_at", raw))
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, is_active, is_superuser, created_at
             FROM app_user WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, is_active, is_superuser, created_at
             FROM app_user WHERE email = ?",
        )
        .bind(email.trim().to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, email, first_name, last_name, is_active, is_superuser, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 is_active = excluded.is_active,
                 is_superuser = excluded.is_superuser",
        )
        .bind(user.id.to_string())
        .bind(user.email.trim().to_ascii_lowercase())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<UserGroup>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, folder_id, role, recursive, builtin FROM user_group WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_group).transpose()
    }

    async fn save_group(&self, group: UserGroup) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_group (id, name, folder_id, role, recursive, builtin)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 folder_id = excluded.folder_id,
                 role = excluded.role,
                 recursive = excluded.recursive",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(group.folder_id.to_string())
        .bind(group.role.as_str())
        .bind(group.recursive)
        .bind(group.builtin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("INSERT OR IGNORE INTO user_group_member (group_id, user_id) VALUES (?, ?)")
            .bind(group_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn group_names_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<String>, RepositoryError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT g.name
             FROM user_group g
             JOIN user_group_member m ON m.group_id = g.id
             WHERE m.user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().collect())
    }

    async fn approver_candidate(
        &self,
        user_id: UserId,
    ) -> Result<Option<ApproverCandidate>, RepositoryError> {
        let Some(user) = self.find_user_by_id(user_id).await? else {
            return Ok(None);
        };
        let groups = self.group_names_for_user(user_id).await?;

        Ok(Some(ApproverCandidate {
            user_id: user.id,
            email: user.email,
            is_active: user.is_active,
            groups,
        }))
    }

    async fn save_token(&self, token: ApiToken) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO api_token (id, user_id, token_hash, label, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(token.id.to_string())
        .bind(token.user_id.to_string())
        .bind(&token.token_hash)
        .bind(&token.label)
        .bind(token.created_at.to_rfc3339())
        .bind(token.expires_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_identity_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, token_hash, label, created_at, expires_at
             FROM api_token WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(token) = row.as_ref().map(row_to_token).transpose()? else {
            return Ok(None);
        };
        if token.is_expired_at(now) {
            return Ok(None);
        }

        let Some(user) = self.find_user_by_id(token.user_id).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }

        let grants = self.grants_for_user(user.id).await?;
        Ok(Some(Identity {
            user_id: user.id,
            email: user.email,
            is_superuser: user.is_superuser,
            grants,
        }))
    }
}

//! User storage trait and implementations.
//!
//! # Architecture
//!
//! - `UserStorage` trait: accounts, roles, preferences and CRM links
//! - `PgUserStorage`: PostgreSQL implementation sharing the `PgStorage` pool
//! - `MockUserStorage`: In-memory implementation for testing
//!
//! ```rust,ignore
//! use inventory_services::users::storage::{MockUserStorage, NewUser, Role, UserStorage};
//!
//! async fn example(storage: &MockUserStorage) {
//!     let user = storage
//!         .create_user(NewUser::local("alice@example.com", "alice", "$argon2id$..."))
//!         .await?;
//!     assert!(user.has_role(Role::User));
//! }
//! ```

use crate::database::{PgStorage, like_pattern};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use uuid::Uuid;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_THEME: &str = "light";

/// Roles seeded in the `roles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn id(self) -> i16 {
        match self {
            Role::Admin => 1,
            Role::User => 2,
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::User),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// PHC string; `None` for accounts created through an OAuth provider.
    pub password_hash: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub is_blocked: bool,
    pub ui_language: String,
    pub ui_theme: String,
    pub crm_account_id: Option<String>,
    pub crm_contact_id: Option<String>,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name().to_owned()).collect()
    }
}

/// Values for a new account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub roles: Vec<Role>,
}

impl NewUser {
    /// An unverified email/password account with the `User` role.
    pub fn local(
        email: impl Into<String>,
        username: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password_hash: Some(password_hash.into()),
            provider: None,
            provider_id: None,
            is_email_verified: false,
            email_verification_token: None,
            email_verification_expires_at: None,
            roles: vec![Role::User],
        }
    }

    /// A verified account backed by an external identity provider.
    pub fn external(
        email: impl Into<String>,
        username: impl Into<String>,
        provider: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username: username.into(),
            password_hash: None,
            provider: Some(provider.into()),
            provider_id: Some(provider_id.into()),
            is_email_verified: true,
            email_verification_token: None,
            email_verification_expires_at: None,
            roles: vec![Role::User],
        }
    }

    pub fn with_verification(mut self, token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        self.email_verification_token = Some(token.into());
        self.email_verification_expires_at = Some(expires_at);
        self
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    fn into_stored(self, id: Uuid, created_at: DateTime<Utc>) -> StoredUser {
        StoredUser {
            id,
            email: self.email,
            username: self.username,
            password_hash: self.password_hash,
            provider: self.provider,
            provider_id: self.provider_id,
            is_email_verified: self.is_email_verified,
            email_verification_token: self.email_verification_token,
            email_verification_expires_at: self.email_verification_expires_at,
            is_blocked: false,
            ui_language: DEFAULT_LANGUAGE.to_owned(),
            ui_theme: DEFAULT_THEME.to_owned(),
            crm_account_id: None,
            crm_contact_id: None,
            roles: self.roles,
            created_at,
        }
    }
}

/// Error type for user storage operations.
#[derive(Debug, thiserror::Error)]
pub enum UserStorageError {
    /// The email or username is taken.
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A database or storage error occurred.
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

type UserResult<T> = Result<T, UserStorageError>;

/// Trait for user storage operations.
///
/// Email lookups are case-insensitive. Mutations on unknown ids fail with
/// [`UserStorageError::UserNotFound`].
pub trait UserStorage: Clone + Send + Sync + 'static {
    /// Creates an account. Fails with `UserAlreadyExists` when the email,
    /// username or provider identity is taken.
    fn create_user(&self, user: NewUser) -> impl Future<Output = UserResult<StoredUser>> + Send;

    fn get_user(&self, id: Uuid) -> impl Future<Output = UserResult<Option<StoredUser>>> + Send;

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = UserResult<Option<StoredUser>>> + Send;

    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = UserResult<Option<StoredUser>>> + Send;

    /// Matches the email first, then the username.
    fn find_by_email_or_username(
        &self,
        identifier: &str,
    ) -> impl Future<Output = UserResult<Option<StoredUser>>> + Send;

    fn find_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> impl Future<Output = UserResult<Option<StoredUser>>> + Send;

    fn find_by_verification_token(
        &self,
        token: &str,
    ) -> impl Future<Output = UserResult<Option<StoredUser>>> + Send;

    /// Marks the email verified and clears the verification token.
    fn mark_email_verified(&self, id: Uuid) -> impl Future<Output = UserResult<()>> + Send;

    fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> impl Future<Output = UserResult<()>> + Send;

    fn update_preferences(
        &self,
        id: Uuid,
        language: &str,
        theme: &str,
    ) -> impl Future<Output = UserResult<StoredUser>> + Send;

    fn set_blocked(&self, id: Uuid, blocked: bool) -> impl Future<Output = UserResult<()>> + Send;

    /// Returns `true` if the user was deleted, `false` if it didn't exist.
    fn delete_user(&self, id: Uuid) -> impl Future<Output = UserResult<bool>> + Send;

    fn add_role(&self, id: Uuid, role: Role) -> impl Future<Output = UserResult<()>> + Send;

    fn remove_role(&self, id: Uuid, role: Role) -> impl Future<Output = UserResult<()>> + Send;

    /// All users, newest first.
    fn list_users(&self) -> impl Future<Output = UserResult<Vec<StoredUser>>> + Send;

    /// Case-insensitive substring match on username or email.
    fn search_users(
        &self,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = UserResult<Vec<StoredUser>>> + Send;

    /// Usernames for the given ids; unknown ids are absent.
    fn usernames(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = UserResult<HashMap<Uuid, String>>> + Send;

    fn set_crm_ids(
        &self,
        id: Uuid,
        account_id: &str,
        contact_id: &str,
    ) -> impl Future<Output = UserResult<()>> + Send;
}

/// In-memory mock implementation of `UserStorage` for testing.
#[derive(Clone, Default)]
pub struct MockUserStorage {
    pub(crate) users: std::sync::Arc<std::sync::RwLock<HashMap<Uuid, StoredUser>>>,
}

impl MockUserStorage {
    /// Creates a new empty `MockUserStorage`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of users in the storage.
    pub fn len(&self) -> usize {
        self.users.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a fully built user (builder pattern).
    ///
    /// Integration tests use this to seed accounts whose ids they also put
    /// into session tokens.
    pub fn with_user(self, user: StoredUser) -> Self {
        self.users
            .write()
            .expect("lock poisoned")
            .insert(user.id, user);
        self
    }

    fn update<T>(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut StoredUser) -> T,
    ) -> UserResult<T> {
        let mut users = self.users.write().expect("lock poisoned");
        let user = users
            .get_mut(&id)
            .ok_or_else(|| UserStorageError::UserNotFound(id.to_string()))?;
        Ok(change(user))
    }

    fn find(&self, predicate: impl Fn(&StoredUser) -> bool) -> Option<StoredUser> {
        let users = self.users.read().expect("lock poisoned");
        users.values().find(|u| predicate(u)).cloned()
    }
}

impl UserStorage for MockUserStorage {
    async fn create_user(&self, user: NewUser) -> UserResult<StoredUser> {
        if user.email.trim().is_empty() || user.username.trim().is_empty() {
            return Err(UserStorageError::InvalidInput(
                "Email and username cannot be empty".to_owned(),
            ));
        }

        let mut users = self.users.write().expect("lock poisoned");

        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(UserStorageError::UserAlreadyExists(user.email));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(UserStorageError::UserAlreadyExists(user.username));
        }
        if let (Some(provider), Some(provider_id)) = (&user.provider, &user.provider_id)
            && users.values().any(|u| {
                u.provider.as_ref() == Some(provider) && u.provider_id.as_ref() == Some(provider_id)
            })
        {
            return Err(UserStorageError::UserAlreadyExists(provider_id.clone()));
        }

        let stored = user.into_stored(Uuid::new_v4(), Utc::now());
        users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_user(&self, id: Uuid) -> UserResult<Option<StoredUser>> {
        let users = self.users.read().expect("lock poisoned");
        Ok(users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<StoredUser>> {
        Ok(self.find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn find_by_username(&self, username: &str) -> UserResult<Option<StoredUser>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_email_or_username(&self, identifier: &str) -> UserResult<Option<StoredUser>> {
        match self.find_by_email(identifier).await? {
            Some(user) => Ok(Some(user)),
            None => self.find_by_username(identifier).await,
        }
    }

    async fn find_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> UserResult<Option<StoredUser>> {
        Ok(self.find(|u| {
            u.provider.as_deref() == Some(provider) && u.provider_id.as_deref() == Some(provider_id)
        }))
    }

    async fn find_by_verification_token(&self, token: &str) -> UserResult<Option<StoredUser>> {
        Ok(self.find(|u| u.email_verification_token.as_deref() == Some(token)))
    }

    async fn mark_email_verified(&self, id: Uuid) -> UserResult<()> {
        self.update(id, |user| {
            user.is_email_verified = true;
            user.email_verification_token = None;
            user.email_verification_expires_at = None;
        })
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> UserResult<()> {
        self.update(id, |user| user.password_hash = Some(password_hash.to_owned()))
    }

    async fn update_preferences(
        &self,
        id: Uuid,
        language: &str,
        theme: &str,
    ) -> UserResult<StoredUser> {
        self.update(id, |user| {
            user.ui_language = language.to_owned();
            user.ui_theme = theme.to_owned();
            user.clone()
        })
    }

    async fn set_blocked(&self, id: Uuid, blocked: bool) -> UserResult<()> {
        self.update(id, |user| user.is_blocked = blocked)
    }

    async fn delete_user(&self, id: Uuid) -> UserResult<bool> {
        let mut users = self.users.write().expect("lock poisoned");
        Ok(users.remove(&id).is_some())
    }

    async fn add_role(&self, id: Uuid, role: Role) -> UserResult<()> {
        self.update(id, |user| {
            if !user.roles.contains(&role) {
                user.roles.push(role);
                user.roles.sort();
            }
        })
    }

    async fn remove_role(&self, id: Uuid, role: Role) -> UserResult<()> {
        self.update(id, |user| user.roles.retain(|r| *r != role))
    }

    async fn list_users(&self) -> UserResult<Vec<StoredUser>> {
        let users = self.users.read().expect("lock poisoned");
        let mut all: Vec<StoredUser> = users.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn search_users(&self, query: &str, limit: usize) -> UserResult<Vec<StoredUser>> {
        let needle = query.to_lowercase();
        let users = self.users.read().expect("lock poisoned");
        let mut found: Vec<StoredUser> = users
            .values()
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found.truncate(limit);
        Ok(found)
    }

    async fn usernames(&self, ids: &[Uuid]) -> UserResult<HashMap<Uuid, String>> {
        let users = self.users.read().expect("lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).map(|u| (*id, u.username.clone())))
            .collect())
    }

    async fn set_crm_ids(&self, id: Uuid, account_id: &str, contact_id: &str) -> UserResult<()> {
        self.update(id, |user| {
            user.crm_account_id = Some(account_id.to_owned());
            user.crm_contact_id = Some(contact_id.to_owned());
        })
    }
}

/// PostgreSQL implementation of `UserStorage` for production use.
///
/// Roles live in `user_roles` and are loaded alongside every user row.
#[derive(Clone)]
pub struct PgUserStorage {
    storage: PgStorage,
}

/// Row type for user queries with all fields.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: Option<String>,
    provider: Option<String>,
    provider_id: Option<String>,
    is_email_verified: bool,
    email_verification_token: Option<String>,
    email_verification_expires_at: Option<DateTime<Utc>>,
    is_blocked: bool,
    ui_language: String,
    ui_theme: String,
    crm_account_id: Option<String>,
    crm_contact_id: Option<String>,
    role_ids: Vec<i16>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for StoredUser {
    fn from(row: UserRow) -> Self {
        let mut roles: Vec<Role> = row.role_ids.into_iter().filter_map(Role::from_id).collect();
        roles.sort();
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            provider: row.provider,
            provider_id: row.provider_id,
            is_email_verified: row.is_email_verified,
            email_verification_token: row.email_verification_token,
            email_verification_expires_at: row.email_verification_expires_at,
            is_blocked: row.is_blocked,
            ui_language: row.ui_language,
            ui_theme: row.ui_theme,
            crm_account_id: row.crm_account_id,
            crm_contact_id: row.crm_contact_id,
            roles,
            created_at: row.created_at,
        }
    }
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.email, u.username, u.password_hash, u.provider, u.provider_id,
           u.is_email_verified, u.email_verification_token, u.email_verification_expires_at,
           u.is_blocked, u.ui_language, u.ui_theme, u.crm_account_id, u.crm_contact_id,
           ARRAY(SELECT ur.role_id FROM user_roles ur WHERE ur.user_id = u.id) AS role_ids,
           u.created_at
    FROM users u
"#;

fn storage_err(err: sqlx::Error) -> UserStorageError {
    UserStorageError::StorageError(err.to_string())
}

impl PgUserStorage {
    /// Creates a new `PgUserStorage` instance wrapping the given `PgStorage`.
    pub fn new(storage: PgStorage) -> Self {
        Self { storage }
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> UserResult<Option<StoredUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE {condition}"))
            .bind(value)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn execute_for_user(&self, sql: &str, id: Uuid) -> UserResult<()> {
        let result = sqlx::query(sql)
            .bind(id)
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }
}

impl UserStorage for PgUserStorage {
    async fn create_user(&self, user: NewUser) -> UserResult<StoredUser> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let mut tx = self.storage.pool.begin().await.map_err(storage_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users
                (id, email, username, password_hash, provider, provider_id, is_email_verified,
                 email_verification_token, email_verification_expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.provider)
        .bind(&user.provider_id)
        .bind(user.is_email_verified)
        .bind(&user.email_verification_token)
        .bind(user.email_verification_expires_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            return Err(match err.as_database_error() {
                Some(db_err) if db_err.is_unique_violation() => UserStorageError::UserAlreadyExists(
                    db_err.constraint().unwrap_or("users").to_owned(),
                ),
                _ => storage_err(err),
            });
        }

        for role in &user.roles {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(id)
                .bind(role.id())
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(user.into_stored(id, created_at))
    }

    async fn get_user(&self, id: Uuid) -> UserResult<Option<StoredUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_by_email(&self, email: &str) -> UserResult<Option<StoredUser>> {
        self.fetch_one_where("LOWER(u.email) = LOWER($1)", email)
            .await
    }

    async fn find_by_username(&self, username: &str) -> UserResult<Option<StoredUser>> {
        self.fetch_one_where("u.username = $1", username).await
    }

    async fn find_by_email_or_username(&self, identifier: &str) -> UserResult<Option<StoredUser>> {
        match self.find_by_email(identifier).await? {
            Some(user) => Ok(Some(user)),
            None => self.find_by_username(identifier).await,
        }
    }

    async fn find_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> UserResult<Option<StoredUser>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{USER_SELECT} WHERE u.provider = $1 AND u.provider_id = $2"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.storage.pool)
        .await
        .map_err(storage_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_by_verification_token(&self, token: &str) -> UserResult<Option<StoredUser>> {
        self.fetch_one_where("u.email_verification_token = $1", token)
            .await
    }

    async fn mark_email_verified(&self, id: Uuid) -> UserResult<()> {
        self.execute_for_user(
            "UPDATE users SET is_email_verified = TRUE, email_verification_token = NULL, \
             email_verification_expires_at = NULL WHERE id = $1",
            id,
        )
        .await
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> UserResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn update_preferences(
        &self,
        id: Uuid,
        language: &str,
        theme: &str,
    ) -> UserResult<StoredUser> {
        let result = sqlx::query("UPDATE users SET ui_language = $2, ui_theme = $3 WHERE id = $1")
            .bind(id)
            .bind(language)
            .bind(theme)
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        self.get_user(id)
            .await?
            .ok_or_else(|| UserStorageError::UserNotFound(id.to_string()))
    }

    async fn set_blocked(&self, id: Uuid, blocked: bool) -> UserResult<()> {
        let result = sqlx::query("UPDATE users SET is_blocked = $2 WHERE id = $1")
            .bind(id)
            .bind(blocked)
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> UserResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_role(&self, id: Uuid, role: Role) -> UserResult<()> {
        if self.get_user(id).await?.is_none() {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(role.id())
        .execute(&self.storage.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn remove_role(&self, id: Uuid, role: Role) -> UserResult<()> {
        if self.get_user(id).await?.is_none() {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(id)
            .bind(role.id())
            .execute(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_users(&self) -> UserResult<Vec<StoredUser>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} ORDER BY u.created_at DESC"))
            .fetch_all(&self.storage.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn search_users(&self, query: &str, limit: usize) -> UserResult<Vec<StoredUser>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{USER_SELECT} WHERE u.username ILIKE $1 OR u.email ILIKE $1 \
             ORDER BY u.username LIMIT $2"
        ))
        .bind(like_pattern(query))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.storage.pool)
        .await
        .map_err(storage_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn usernames(&self, ids: &[Uuid]) -> UserResult<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.storage.pool)
                .await
                .map_err(storage_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn set_crm_ids(&self, id: Uuid, account_id: &str, contact_id: &str) -> UserResult<()> {
        let result =
            sqlx::query("UPDATE users SET crm_account_id = $2, crm_contact_id = $3 WHERE id = $1")
                .bind(id)
                .bind(account_id)
                .bind(contact_id)
                .execute(&self.storage.pool)
                .await
                .map_err(storage_err)?;
        if result.rows_affected() == 0 {
            return Err(UserStorageError::UserNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser {
        NewUser::local("alice@example.com", "alice", "hash")
    }

    #[tokio::test]
    async fn test_mock_create_user_success() {
        let storage = MockUserStorage::new();

        let user = storage
            .create_user(alice())
            .await
            .expect("should create user");

        assert_eq!(user.username, "alice");
        assert_eq!(user.ui_language, DEFAULT_LANGUAGE);
        assert_eq!(user.ui_theme, DEFAULT_THEME);
        assert!(user.has_role(Role::User));
        assert!(!user.is_admin());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_create_user_duplicate_email() {
        let storage = MockUserStorage::new();
        storage.create_user(alice()).await.expect("should create user");

        let result = storage
            .create_user(NewUser::local("ALICE@example.com", "alice2", "hash"))
            .await;

        assert!(matches!(result, Err(UserStorageError::UserAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_mock_create_user_duplicate_username() {
        let storage = MockUserStorage::new();
        storage.create_user(alice()).await.expect("should create user");

        let result = storage
            .create_user(NewUser::local("other@example.com", "alice", "hash"))
            .await;

        assert!(matches!(result, Err(UserStorageError::UserAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_mock_create_user_empty_username() {
        let storage = MockUserStorage::new();
        let result = storage
            .create_user(NewUser::local("a@example.com", " ", "hash"))
            .await;
        assert!(matches!(result, Err(UserStorageError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_mock_lookup_by_identifier_and_provider() {
        let storage = MockUserStorage::new();
        let local = storage.create_user(alice()).await.unwrap();
        let external = storage
            .create_user(NewUser::external("bob@example.com", "bob", "GitHub", "42"))
            .await
            .unwrap();

        let by_email = storage.find_by_email_or_username("Alice@Example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(local.id));

        let by_name = storage.find_by_email_or_username("bob").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(external.id));

        let by_provider = storage.find_by_provider("GitHub", "42").await.unwrap();
        assert!(by_provider.unwrap().is_email_verified);
        assert!(storage.find_by_provider("Google", "42").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_verification_clears_token() {
        let storage = MockUserStorage::new();
        let user = storage
            .create_user(alice().with_verification("tok", Utc::now()))
            .await
            .unwrap();

        let found = storage.find_by_verification_token("tok").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));

        storage.mark_email_verified(user.id).await.unwrap();
        assert!(storage.find_by_verification_token("tok").await.unwrap().is_none());
        assert!(storage.get_user(user.id).await.unwrap().unwrap().is_email_verified);
    }

    #[tokio::test]
    async fn test_mock_roles_and_blocking() {
        let storage = MockUserStorage::new();
        let user = storage.create_user(alice()).await.unwrap();

        storage.add_role(user.id, Role::Admin).await.unwrap();
        storage.add_role(user.id, Role::Admin).await.unwrap();
        let updated = storage.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(updated.roles, vec![Role::Admin, Role::User]);

        storage.remove_role(user.id, Role::Admin).await.unwrap();
        storage.set_blocked(user.id, true).await.unwrap();
        let updated = storage.get_user(user.id).await.unwrap().unwrap();
        assert!(!updated.is_admin());
        assert!(updated.is_blocked);

        let missing = storage.set_blocked(Uuid::new_v4(), true).await;
        assert!(matches!(missing, Err(UserStorageError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_mock_search_and_usernames() {
        let storage = MockUserStorage::new();
        let a = storage.create_user(alice()).await.unwrap();
        storage
            .create_user(NewUser::local("carol@corp.com", "carol", "hash"))
            .await
            .unwrap();

        let found = storage.search_users("EXAMPLE", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        let names = storage.usernames(&[a.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&a.id], "alice");
    }

    #[test]
    fn role_ids_round_trip() {
        for role in [Role::Admin, Role::User] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(9), None);
    }
}

//! V1 API module containing all versioned API endpoints.
//!
//! Sub-modules by resource:
//! - `inventories` - inventory CRUD, listings and stats
//! - `items` - items and likes
//! - `sharing` - access grants and comments
//! - `custom_ids` - custom ID formats
//! - `tokens` - inventory API tokens and `/data`
//! - `tags` - tag cloud and categories
//! - `uploads` - presigned image uploads
//! - `admin` - user management
//! - `crm` - Salesforce sync
//! - `types` - shared types (error responses, etc.)

pub mod admin;
pub mod crm;
pub mod custom_ids;
pub mod inventories;
pub mod items;
pub mod sharing;
pub mod tags;
pub mod tokens;
pub mod types;
pub mod uploads;

use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Creates the V1 API router with all endpoints.
pub fn routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        // Inventories
        .route(
            "/inventories",
            get(inventories::latest::<S, U>).post(inventories::create::<S, U>),
        )
        .route("/inventories/my", get(inventories::my::<S, U>))
        .route("/inventories/shared", get(inventories::shared::<S, U>))
        .route("/inventories/public", get(inventories::public::<S, U>))
        .route("/inventories/popular", get(inventories::popular::<S, U>))
        .route("/inventories/search", get(inventories::search::<S, U>))
        .route(
            "/inventories/{id}",
            get(inventories::get::<S, U>)
                .put(inventories::update::<S, U>)
                .delete(inventories::delete::<S, U>),
        )
        .route("/inventories/{id}/stats", get(inventories::stats::<S, U>))
        // Access grants and comments
        .route(
            "/inventories/{id}/access",
            get(sharing::list_access::<S, U>).post(sharing::grant_access::<S, U>),
        )
        .route(
            "/inventories/{id}/access/{user_id}",
            delete(sharing::revoke_access::<S, U>),
        )
        .route(
            "/inventories/{id}/comments",
            get(sharing::list_comments::<S, U>).post(sharing::add_comment::<S, U>),
        )
        // Custom IDs
        .route(
            "/inventories/{id}/custom-id",
            get(custom_ids::get::<S, U>).put(custom_ids::save::<S, U>),
        )
        .route(
            "/inventories/{id}/custom-id/validate",
            post(custom_ids::validate::<S, U>),
        )
        .route("/custom-id/preview", post(custom_ids::preview))
        // Items
        .route(
            "/inventories/{id}/items",
            get(items::list::<S, U>).post(items::create::<S, U>),
        )
        .route(
            "/items/{id}",
            get(items::get::<S, U>)
                .put(items::update::<S, U>)
                .delete(items::delete::<S, U>),
        )
        .route(
            "/items/{id}/like",
            post(items::like::<S, U>).delete(items::unlike::<S, U>),
        )
        // API tokens
        .route(
            "/inventories/{id}/tokens",
            get(tokens::list::<S, U>).post(tokens::create::<S, U>),
        )
        .route("/tokens/{id}", delete(tokens::revoke::<S, U>))
        .route("/data", get(tokens::data::<S, U>))
        // Tags and categories
        .route("/tags", get(tags::list::<S, U>))
        .route("/tags/{name}/inventories", get(tags::inventories::<S, U>))
        .route("/categories", get(tags::categories::<S, U>))
        // Uploads
        .route("/uploads/images", post(uploads::image::<S, U>))
        // Admin
        .route("/admin/users", get(admin::list::<S, U>))
        .route("/admin/users/search", get(admin::search::<S, U>))
        .route("/admin/users/{id}", delete(admin::delete::<S, U>))
        .route("/admin/users/{id}/block", post(admin::block::<S, U>))
        .route("/admin/users/{id}/unblock", post(admin::unblock::<S, U>))
        .route(
            "/admin/users/{id}/admin",
            post(admin::add_admin::<S, U>).delete(admin::remove_admin::<S, U>),
        )
        .route(
            "/admin/users/{id}/crm",
            get(crm::admin_status::<S, U>).post(crm::admin_sync::<S, U>),
        )
        // CRM
        .route("/crm/accounts", post(crm::sync_self::<S, U>))
        .route("/crm/status", get(crm::status_self::<S, U>))
}

//! Handlers for the `/auth/*` endpoints.

use axum::{
    Json, Router,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use super::{
    AuthError, AuthResponse, AuthService, ChangePasswordRequest, GithubCodeRequest, LoginRequest,
    MessageResponse, PreferencesRequest, ProviderTokenRequest, RegisterRequest, RequireAuth,
    UserDto, VerifyEmailRequest,
};
use crate::config::Config;
use crate::database::SqlStorage;
use crate::state::AppState;
use crate::users::storage::UserStorage;

/// Creates the router for authentication endpoints.
pub fn auth_routes<S, U>() -> Router<AppState<S, U>>
where
    S: SqlStorage,
    U: UserStorage,
{
    Router::new()
        .route("/register", post(register::<S, U>))
        .route("/login", post(login::<S, U>))
        .route("/google", post(google::<S, U>))
        .route("/github", post(github::<S, U>))
        .route("/github/exchange", post(github_exchange::<S, U>))
        .route("/verify-email", post(verify_email::<S, U>))
        .route("/logout", post(logout))
        .route("/me", get(me::<S, U>))
        .route("/me/preferences", put(update_preferences::<S, U>))
        .route("/change-password", post(change_password::<S, U>))
}

fn service<'a, S, U>(state: &'a AppState<S, U>, config: &'a Config) -> AuthService<'a, U>
where
    U: UserStorage,
{
    AuthService::new(
        &state.user_storage,
        config,
        state.integrations.mailer.as_ref(),
    )
}

/// POST /auth/register
#[tracing::instrument(skip_all)]
pub async fn register<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let response = service(&state, &config).register(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login
#[tracing::instrument(skip_all)]
pub async fn login<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(service(&state, &config).login(payload).await?))
}

/// POST /auth/google with a Google access token.
#[tracing::instrument(skip_all)]
pub async fn google<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    Json(payload): Json<ProviderTokenRequest>,
) -> Result<Json<AuthResponse>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let profile = state
        .integrations
        .oauth
        .google_user(&payload.access_token)
        .await?;
    Ok(Json(service(&state, &config).external_login(profile).await?))
}

/// POST /auth/github with a GitHub access token.
#[tracing::instrument(skip_all)]
pub async fn github<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    Json(payload): Json<ProviderTokenRequest>,
) -> Result<Json<AuthResponse>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let profile = state
        .integrations
        .oauth
        .github_user(&payload.access_token)
        .await?;
    Ok(Json(service(&state, &config).external_login(profile).await?))
}

/// POST /auth/github/exchange with the code from GitHub's redirect.
#[tracing::instrument(skip_all)]
pub async fn github_exchange<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    Json(payload): Json<GithubCodeRequest>,
) -> Result<Json<AuthResponse>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let oauth = &state.integrations.oauth;
    let access_token = oauth.exchange_github_code(&payload.code).await?;
    let profile = oauth.github_user(&access_token).await?;
    Ok(Json(service(&state, &config).external_login(profile).await?))
}

/// POST /auth/verify-email
#[tracing::instrument(skip_all)]
pub async fn verify_email<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    service(&state, &config).verify_email(&payload.token).await?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// POST /auth/logout
///
/// Sessions are stateless; the client drops its token.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse::new("Logged out successfully"))
}

/// GET /auth/me
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn me<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    auth: RequireAuth,
) -> Result<Json<UserDto>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    Ok(Json(service(&state, &config).me(auth.user_id()).await?))
}

/// PUT /auth/me/preferences
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn update_preferences<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    auth: RequireAuth,
    Json(payload): Json<PreferencesRequest>,
) -> Result<Json<UserDto>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    let user = service(&state, &config)
        .update_preferences(auth.user_id(), payload)
        .await?;
    Ok(Json(user))
}

/// POST /auth/change-password
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn change_password<S, U>(
    State(state): State<AppState<S, U>>,
    Extension(config): Extension<Config>,
    auth: RequireAuth,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError>
where
    S: SqlStorage,
    U: UserStorage,
{
    service(&state, &config)
        .change_password(auth.user_id(), payload)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

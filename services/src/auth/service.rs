//! Account flows behind the `/auth` routes.

use super::password::{hash_password, verify_password};
use super::session::generate_session_token;
use super::{
    AuthError, AuthResponse, ChangePasswordRequest, LoginRequest, PreferencesRequest,
    RegisterRequest, UserDto,
};
use crate::config::Config;
use crate::email::Mailer;
use crate::oauth::ExternalProfile;
use crate::users::storage::{NewUser, StoredUser, UserStorage};
use chrono::{Duration, Utc};
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_LANGUAGE_LENGTH: usize = 10;
pub const THEMES: [&str; 2] = ["light", "dark"];
const VERIFICATION_TTL_HOURS: i64 = 24;
const MAX_USERNAME_SUFFIX: u32 = 1000;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_new_password(password: &str, confirm: &str, mismatch: &str) -> Result<(), AuthError> {
    if password != confirm {
        return Err(AuthError::Validation(mismatch.to_owned()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn hash(password: &str) -> Result<String, AuthError> {
    hash_password(password).map_err(|e| AuthError::Storage(format!("password hashing failed: {e}")))
}

pub struct AuthService<'a, U> {
    users: &'a U,
    config: &'a Config,
    mailer: &'a dyn Mailer,
}

impl<'a, U: UserStorage> AuthService<'a, U> {
    pub fn new(users: &'a U, config: &'a Config, mailer: &'a dyn Mailer) -> Self {
        Self {
            users,
            config,
            mailer,
        }
    }

    fn respond(&self, user: &StoredUser, message: &str) -> Result<AuthResponse, AuthError> {
        Ok(AuthResponse {
            token: generate_session_token(user, self.config)?,
            user: UserDto::from(user),
            message: message.to_owned(),
        })
    }

    async fn load(&self, user_id: Uuid) -> Result<StoredUser, AuthError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_owned()))
    }

    pub async fn register(&self, input: RegisterRequest) -> Result<AuthResponse, AuthError> {
        check_new_password(&input.password, &input.confirm_password, "Passwords do not match")?;

        let email = normalize_email(&input.email);
        let username = input.username.trim().to_owned();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Validation("A valid email is required".to_owned()));
        }
        if username.is_empty() {
            return Err(AuthError::Validation("Username is required".to_owned()));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict(
                "User with this email already exists".to_owned(),
            ));
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::Conflict("Username is already taken".to_owned()));
        }

        let verification_token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS);
        let user = self
            .users
            .create_user(
                NewUser::local(email, username, hash(&input.password)?)
                    .with_verification(verification_token.clone(), expires_at),
            )
            .await?;

        let link = format!(
            "{}/verify-email?token={verification_token}",
            self.config.app_base_url()
        );
        if let Err(e) = self
            .mailer
            .send_verification_email(&user.email, &user.username, &link)
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to send verification email");
        }

        tracing::info!(user_id = %user.id, "User registered");
        self.respond(
            &user,
            "Registration successful. Please check your email to verify your account.",
        )
    }

    pub async fn login(&self, input: LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .users
            .find_by_email(&normalize_email(&input.email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::SocialAccount);
        };
        if user.is_blocked {
            return Err(AuthError::Blocked);
        }
        if !verify_password(&input.password, password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        self.respond(&user, "Login successful")
    }

    /// Signs in with a provider identity, creating the account on first use.
    pub async fn external_login(&self, profile: ExternalProfile) -> Result<AuthResponse, AuthError> {
        let existing = self
            .users
            .find_by_provider(profile.provider, &profile.provider_id)
            .await?;

        let (user, message) = match existing {
            Some(user) => (user, "Login successful"),
            None => {
                let email = normalize_email(&profile.email);
                if self.users.find_by_email(&email).await?.is_some() {
                    return Err(AuthError::Conflict(
                        "An account with this email already exists. Please login with email/password."
                            .to_owned(),
                    ));
                }
                let username = self.unique_username(profile.username.trim()).await?;
                let user = self
                    .users
                    .create_user(NewUser::external(
                        email,
                        username,
                        profile.provider,
                        profile.provider_id,
                    ))
                    .await?;
                tracing::info!(user_id = %user.id, provider = profile.provider, "External account created");
                (user, "Account created successfully")
            }
        };

        if user.is_blocked {
            return Err(AuthError::Blocked);
        }
        self.respond(&user, message)
    }

    async fn unique_username(&self, base: &str) -> Result<String, AuthError> {
        let base = if base.is_empty() { "user" } else { base };
        if self.users.find_by_username(base).await?.is_none() {
            return Ok(base.to_owned());
        }
        for suffix in 2..=MAX_USERNAME_SUFFIX {
            let candidate = format!("{base}-{suffix}");
            if self.users.find_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Ok(format!("{base}-{}", Uuid::new_v4().simple()))
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let user = self
            .users
            .find_by_verification_token(token)
            .await?
            .ok_or_else(|| AuthError::Validation("Invalid verification token".to_owned()))?;

        if user
            .email_verification_expires_at
            .is_some_and(|expires| expires < Utc::now())
        {
            return Err(AuthError::Validation(
                "Verification token has expired".to_owned(),
            ));
        }

        self.users.mark_email_verified(user.id).await?;
        tracing::info!(user_id = %user.id, "Email verified");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        input: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        check_new_password(
            &input.new_password,
            &input.confirm_password,
            "New passwords do not match",
        )?;

        let user = self.load(user_id).await?;
        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::Validation(
                "Cannot change password for social login accounts".to_owned(),
            ));
        };
        if !verify_password(&input.current_password, password_hash) {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_owned(),
            ));
        }

        self.users
            .update_password_hash(user_id, &hash(&input.new_password)?)
            .await?;
        Ok(())
    }

    pub async fn me(&self, user_id: Uuid) -> Result<UserDto, AuthError> {
        Ok(UserDto::from(&self.load(user_id).await?))
    }

    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        input: PreferencesRequest,
    ) -> Result<UserDto, AuthError> {
        let theme = input.theme.trim().to_lowercase();
        if !THEMES.contains(&theme.as_str()) {
            return Err(AuthError::Validation(
                "Theme must be 'light' or 'dark'".to_owned(),
            ));
        }
        let language = input.language.trim();
        if language.is_empty() || language.chars().count() > MAX_LANGUAGE_LENGTH {
            return Err(AuthError::Validation("Invalid language code".to_owned()));
        }

        let user = self
            .users
            .update_preferences(user_id, language, &theme)
            .await?;
        Ok(UserDto::from(&user))
    }
}

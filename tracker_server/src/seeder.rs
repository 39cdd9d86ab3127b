//! Superuser creation and first-start bootstrap.

use diesel_async::AsyncPgConnection;

use crate::models::user::{NewUser, User};
use crate::services::{password, user_service};

/// Details for a new system administrator.
#[derive(Debug, Clone)]
pub struct SuperuserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SuperuserRequest {
    /// Read `SUPERUSER_USERNAME`, `SUPERUSER_EMAIL` and `SUPERUSER_PASSWORD`.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup("SUPERUSER_USERNAME").filter(|s| !s.trim().is_empty())?;
        let password = lookup("SUPERUSER_PASSWORD").filter(|s| !s.is_empty())?;
        Some(Self {
            username: username.trim().to_string(),
            email: lookup("SUPERUSER_EMAIL").unwrap_or_default().trim().to_string(),
            password,
        })
    }

    /// Checks that need no database access.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.username.is_empty() {
            anyhow::bail!("Username is required.");
        }
        if !self.email.is_empty() && !user_service::is_valid_email(&self.email) {
            anyhow::bail!("Enter a valid email address.");
        }
        password::validate_password(&self.password, &self.username, &self.email)
            .map_err(|errors| anyhow::anyhow!(errors.join(" ")))
    }
}

/// Create an active staff superuser.
pub async fn create_superuser(
    conn: &mut AsyncPgConnection,
    request: &SuperuserRequest,
) -> anyhow::Result<User> {
    request.validate()?;
    if user_service::username_taken(conn, &request.username, None).await? {
        anyhow::bail!("Username '{}' already exists.", request.username);
    }

    let encoded = password::hash_in_background(request.password.clone()).await?;
    user_service::create_user(
        conn,
        NewUser {
            username: request.username.clone(),
            email: request.email.clone(),
            password: encoded,
            is_superuser: true,
            is_staff: true,
            is_active: true,
        },
    )
    .await
}

/// Create the first superuser from the environment when none exists yet.
///
/// Idempotent: does nothing once any superuser is present.
pub async fn bootstrap_superuser(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    if user_service::count_superusers(conn).await? > 0 {
        return Ok(());
    }

    match SuperuserRequest::from_lookup(|key| std::env::var(key).ok()) {
        Some(request) => {
            let user = create_superuser(conn, &request).await?;
            tracing::info!(username = %user.username, "Bootstrap superuser created");
        }
        None => tracing::warn!(
            "No superuser exists; run `certificate-tracker create-superuser` \
             or set SUPERUSER_USERNAME and SUPERUSER_PASSWORD"
        ),
    }
    Ok(())
}

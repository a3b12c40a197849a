//! Account service
//!
//! The only component allowed to mutate confirmation, credential and
//! email state on a user record. Every such transition is gated by a
//! signed action token; verification failure leaves state untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::auth::{issue_action_token, password, verify_action_token, TokenAction};
use crate::config::AppConfig;
use crate::data::{avatar_hash_for_email, Database, EntityId, Role, User};
use crate::error::AppError;
use crate::mail::{Mailer, OutgoingMail};
use crate::validate;

/// Account service
pub struct AccountService {
    db: Arc<Database>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AppConfig>,
}

impl AccountService {
    /// Create new account service
    pub fn new(db: Arc<Database>, mailer: Arc<dyn Mailer>, config: Arc<AppConfig>) -> Self {
        Self { db, mailer, config }
    }

    fn token_ttl(&self) -> Duration {
        Duration::seconds(self.config.auth.token_ttl_seconds)
    }

    fn secret(&self) -> &str {
        &self.config.auth.secret_key
    }

    async fn mail_token(&self, user: &User, to: &str, subject: &str, template: &str, token: String) {
        let mut context = HashMap::new();
        context.insert("username".to_string(), user.username.clone());
        context.insert("token".to_string(), token);

        let mail = OutgoingMail {
            to: to.to_string(),
            subject: subject.to_string(),
            template: template.to_string(),
            context,
        };

        // Fire-and-forget: delivery failures are logged, never retried.
        if let Err(error) = self.mailer.send(mail).await {
            tracing::warn!(user = %user.username, template, %error, "Failed to hand mail to mailer");
        }
    }

    /// Resolve the role for a fresh registration
    ///
    /// The configured admin email receives the Administrator role,
    /// everyone else the designated default role.
    async fn registration_role(&self, email: &str) -> Result<Role, AppError> {
        if let Some(admin_email) = self.config.admin.email.as_deref() {
            if email.eq_ignore_ascii_case(admin_email) {
                if let Some(role) = self.db.get_role_by_name("Administrator").await? {
                    return Ok(role);
                }
            }
        }

        self.db.get_default_role().await?.ok_or_else(|| {
            AppError::Config("no default role is seeded; run role seeding first".to_string())
        })
    }

    /// Register a new user
    ///
    /// Creates the user row and its self-follow edge in one
    /// transaction, then issues a confirmation token and mails it.
    ///
    /// # Errors
    /// `Validation` for rejected input, `Conflict` when the email or
    /// username is already claimed.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password_plain: &str,
    ) -> Result<User, AppError> {
        let email = email.trim().to_ascii_lowercase();
        let username = username.trim().to_string();

        let errors = validate::registration(&email, &username, password_plain);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        if self.db.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("email already registered".to_string()));
        }
        if self.db.get_user_by_username(&username).await?.is_some() {
            return Err(AppError::Conflict("username already taken".to_string()));
        }

        let role = self.registration_role(&email).await?;
        let password_hash = password::hash_password(password_plain.to_string()).await?;

        let now = Utc::now();
        let user = User {
            id: EntityId::new().0,
            email: email.clone(),
            username,
            password_hash,
            role_id: role.id.clone(),
            confirmed: false,
            name: None,
            location: None,
            about_me: None,
            avatar_hash: avatar_hash_for_email(&email),
            created_at: now,
            last_seen: now,
        };

        self.db.insert_user_with_self_follow(&user).await?;

        crate::metrics::USERS_REGISTERED_TOTAL
            .with_label_values(&[role.name.as_str()])
            .inc();
        tracing::info!(username = %user.username, role = %role.name, "User registered");

        self.request_confirmation(&user).await?;

        Ok(user)
    }

    /// Authenticate by email and password
    ///
    /// # Errors
    /// `Unauthorized` for unknown email or wrong password, without
    /// distinguishing the two.
    pub async fn login(&self, email: &str, password_plain: &str) -> Result<User, AppError> {
        let email = email.trim().to_ascii_lowercase();
        let user = self
            .db
            .get_user_by_email(&email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let ok =
            password::verify_password(password_plain.to_string(), user.password_hash.clone())
                .await?;
        if !ok {
            return Err(AppError::Unauthorized);
        }

        self.db.touch_user_last_seen(&user.id, Utc::now()).await?;
        Ok(user)
    }

    // =========================================================================
    // Confirmation
    // =========================================================================

    /// Issue a confirmation token and mail it to the user
    pub async fn request_confirmation(&self, user: &User) -> Result<(), AppError> {
        let token = issue_action_token(
            self.secret(),
            &user.id,
            TokenAction::Confirm,
            None,
            self.token_ttl(),
        )?;

        self.mail_token(user, &user.email, "Confirm your account", "auth/confirm", token)
            .await;
        Ok(())
    }

    /// Confirm an account with a token
    ///
    /// No-op success when the account is already confirmed. Any
    /// verification failure leaves the flag unchanged.
    pub async fn confirm(&self, user: &User, token: &str) -> Result<(), AppError> {
        if user.confirmed {
            return Ok(());
        }

        verify_action_token(self.secret(), token, TokenAction::Confirm, &user.id)?;

        if !self.db.set_user_confirmed(&user.id).await? {
            return Err(AppError::NotFound);
        }

        tracing::info!(username = %user.username, "Account confirmed");
        Ok(())
    }

    // =========================================================================
    // Passwords
    // =========================================================================

    /// Change password for a logged-in user
    ///
    /// The current credential must verify first.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let errors = validate::new_password(new_password);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        let ok = password::verify_password(
            current_password.to_string(),
            user.password_hash.clone(),
        )
        .await?;
        if !ok {
            return Err(AppError::Validation(
                "current password is incorrect".to_string(),
            ));
        }

        let new_hash = password::hash_password(new_password.to_string()).await?;
        if !self.db.update_user_password_hash(&user.id, &new_hash).await? {
            return Err(AppError::NotFound);
        }

        tracing::info!(username = %user.username, "Password changed");
        Ok(())
    }

    /// Request a password reset for an email address
    ///
    /// Silently no-ops when the email is unknown so this layer never
    /// leaks account existence; the HTTP layer presents an identical
    /// message either way.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let email = email.trim().to_ascii_lowercase();
        let Some(user) = self.db.get_user_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = issue_action_token(
            self.secret(),
            &user.id,
            TokenAction::Reset,
            None,
            self.token_ttl(),
        )?;

        self.mail_token(
            &user,
            &user.email,
            "Reset your password",
            "auth/reset_password",
            token,
        )
        .await;
        Ok(())
    }

    /// Reset a password with a token
    ///
    /// The token must be a `reset` token for the user owning the
    /// email address; the credential is re-hashed on success only.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let errors = validate::new_password(new_password);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        let email = email.trim().to_ascii_lowercase();
        // An unknown email gets the same uniform failure as a bad token.
        let user = self
            .db
            .get_user_by_email(&email)
            .await?
            .ok_or(AppError::InvalidToken)?;

        verify_action_token(self.secret(), token, TokenAction::Reset, &user.id)?;

        let new_hash = password::hash_password(new_password.to_string()).await?;
        if !self.db.update_user_password_hash(&user.id, &new_hash).await? {
            return Err(AppError::NotFound);
        }

        tracing::info!(username = %user.username, "Password reset");
        Ok(())
    }

    // =========================================================================
    // Email change
    // =========================================================================

    /// Request an email change
    ///
    /// The current credential must verify; the token carrying the
    /// proposed address is mailed to the NEW address.
    pub async fn request_email_change(
        &self,
        user: &User,
        new_email: &str,
        current_password: &str,
    ) -> Result<(), AppError> {
        let new_email = new_email.trim().to_ascii_lowercase();

        let errors = validate::email_change(&new_email);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        let ok = password::verify_password(
            current_password.to_string(),
            user.password_hash.clone(),
        )
        .await?;
        if !ok {
            return Err(AppError::Validation(
                "current password is incorrect".to_string(),
            ));
        }

        if let Some(existing) = self.db.get_user_by_email(&new_email).await? {
            if existing.id != user.id {
                return Err(AppError::Conflict("email already registered".to_string()));
            }
        }

        let token = issue_action_token(
            self.secret(),
            &user.id,
            TokenAction::ChangeEmail,
            Some(new_email.clone()),
            self.token_ttl(),
        )?;

        self.mail_token(
            user,
            &new_email,
            "Confirm your new email address",
            "auth/change_email",
            token,
        )
        .await;
        Ok(())
    }

    /// Apply an email change with a token
    ///
    /// The decoded payload supplies the new address. Fails when the
    /// payload lacks one or the address is claimed by another user;
    /// on success email and avatar fingerprint change together.
    pub async fn change_email(&self, user: &User, token: &str) -> Result<User, AppError> {
        let payload =
            verify_action_token(self.secret(), token, TokenAction::ChangeEmail, &user.id)?;

        let new_email = payload.new_email.ok_or(AppError::InvalidToken)?;

        if let Some(existing) = self.db.get_user_by_email(&new_email).await? {
            if existing.id != user.id {
                return Err(AppError::Conflict("email already registered".to_string()));
            }
        }

        let avatar_hash = avatar_hash_for_email(&new_email);
        if !self
            .db
            .update_user_email(&user.id, &new_email, &avatar_hash)
            .await?
        {
            return Err(AppError::NotFound);
        }

        tracing::info!(username = %user.username, "Email changed");

        let mut updated = user.clone();
        updated.email = new_email;
        updated.avatar_hash = avatar_hash;
        Ok(updated)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Update the user's own profile fields
    pub async fn update_profile(
        &self,
        user: &User,
        name: Option<String>,
        location: Option<String>,
        about_me: Option<String>,
    ) -> Result<User, AppError> {
        let errors = validate::profile(name.as_deref(), location.as_deref());
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        if !self
            .db
            .update_user_profile(
                &user.id,
                name.as_deref(),
                location.as_deref(),
                about_me.as_deref(),
            )
            .await?
        {
            return Err(AppError::NotFound);
        }

        let mut updated = user.clone();
        updated.name = name;
        updated.location = location;
        updated.about_me = about_me;
        Ok(updated)
    }

    /// Administrative edit of another user's account
    ///
    /// Callers must hold ADMINISTER; this service only applies the
    /// change.
    pub async fn admin_update(
        &self,
        user_id: &str,
        email: &str,
        username: &str,
        confirmed: bool,
        role_id: &str,
    ) -> Result<User, AppError> {
        let email = email.trim().to_ascii_lowercase();
        let username = username.trim().to_string();

        let errors = validate::admin_account(&email, &username);
        if !errors.is_empty() {
            return Err(validate::into_app_error(errors));
        }

        let target = self.db.get_user(user_id).await?.ok_or(AppError::NotFound)?;

        if let Some(existing) = self.db.get_user_by_email(&email).await? {
            if existing.id != target.id {
                return Err(AppError::Conflict("email already registered".to_string()));
            }
        }
        if let Some(existing) = self.db.get_user_by_username(&username).await? {
            if existing.id != target.id {
                return Err(AppError::Conflict("username already taken".to_string()));
            }
        }
        if self.db.get_role(role_id).await?.is_none() {
            return Err(AppError::Validation("unknown role".to_string()));
        }

        let avatar_hash = avatar_hash_for_email(&email);
        if !self
            .db
            .update_user_admin_fields(user_id, &email, &username, confirmed, role_id, &avatar_hash)
            .await?
        {
            return Err(AppError::NotFound);
        }

        self.db
            .get_user(user_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::test_config;
    use crate::mail::RecordingMailer;
    use tempfile::TempDir;

    async fn setup() -> (AccountService, Arc<Database>, Arc<RecordingMailer>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("account.db"))
                .await
                .unwrap(),
        );
        db.seed_roles().await.unwrap();

        let mailer = Arc::new(RecordingMailer::new());
        let config = Arc::new(test_config());
        let service = AccountService::new(db.clone(), mailer.clone(), config);
        (service, db, mailer, temp_dir)
    }

    #[tokio::test]
    async fn register_assigns_default_role_and_self_follow() {
        let (service, db, mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        assert!(!user.confirmed);
        assert_ne!(user.password_hash, "long-enough-pw");

        let role = db.get_role(&user.role_id).await.unwrap().unwrap();
        assert_eq!(role.name, "User");
        assert!(role.is_default);

        // Self-follow exists without an explicit follow call.
        assert!(db.is_following(&user.id, &user.id).await.unwrap());

        // Confirmation mail went out.
        let sent = mailer.sent_to("alice@example.com");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "auth/confirm");
        assert!(sent[0].context.contains_key("token"));
    }

    #[tokio::test]
    async fn register_admin_email_gets_administrator_role() {
        let (service, db, _mailer, _tmp) = setup().await;

        let user = service
            .register("admin@example.com", "boss", "long-enough-pw")
            .await
            .unwrap();
        let role = db.get_role(&user.role_id).await.unwrap().unwrap();
        assert_eq!(role.name, "Administrator");
        assert!(role.grants(crate::data::Permission::ADMINISTER));
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let (service, _db, _mailer, _tmp) = setup().await;

        service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        let same_email = service
            .register("alice@example.com", "alice2", "long-enough-pw")
            .await
            .unwrap_err();
        assert!(matches!(same_email, AppError::Conflict(_)));

        let same_username = service
            .register("alice2@example.com", "alice", "long-enough-pw")
            .await
            .unwrap_err();
        assert!(matches!(same_username, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn confirm_flow_flips_flag_once() {
        let (service, db, mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        let token = mailer.sent_to("alice@example.com")[0].context["token"].clone();
        service.confirm(&user, &token).await.unwrap();

        let confirmed = db.get_user(&user.id).await.unwrap().unwrap();
        assert!(confirmed.confirmed);

        // Already-confirmed users short-circuit even with a bad token.
        service.confirm(&confirmed, "garbage").await.unwrap();
    }

    #[tokio::test]
    async fn confirm_rejects_token_for_other_user() {
        let (service, db, mailer, _tmp) = setup().await;

        let alice = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();
        let bob = service
            .register("bob@example.com", "bob", "long-enough-pw")
            .await
            .unwrap();

        let bob_token = mailer.sent_to("bob@example.com")[0].context["token"].clone();
        let error = service.confirm(&alice, &bob_token).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidToken));

        // State untouched.
        assert!(!db.get_user(&alice.id).await.unwrap().unwrap().confirmed);
    }

    #[tokio::test]
    async fn login_verifies_credentials() {
        let (service, _db, _mailer, _tmp) = setup().await;

        service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        let user = service
            .login("Alice@Example.com", "long-enough-pw")
            .await
            .unwrap();
        assert_eq!(user.username, "alice");

        let wrong = service.login("alice@example.com", "nope-nope-nope").await;
        assert!(matches!(wrong, Err(AppError::Unauthorized)));

        let unknown = service.login("ghost@example.com", "long-enough-pw").await;
        assert!(matches!(unknown, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let (service, _db, mailer, _tmp) = setup().await;

        service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        // Unknown email: silent no-op, no mail.
        service
            .request_password_reset("ghost@example.com")
            .await
            .unwrap();
        assert!(mailer.sent_to("ghost@example.com").is_empty());

        service
            .request_password_reset("alice@example.com")
            .await
            .unwrap();
        let reset_mail = mailer
            .sent_to("alice@example.com")
            .into_iter()
            .find(|m| m.template == "auth/reset_password")
            .unwrap();
        let token = reset_mail.context["token"].clone();

        service
            .reset_password("alice@example.com", &token, "brand-new-password")
            .await
            .unwrap();

        service
            .login("alice@example.com", "brand-new-password")
            .await
            .unwrap();
        let old = service.login("alice@example.com", "long-enough-pw").await;
        assert!(matches!(old, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn expired_reset_token_leaves_password_unchanged() {
        let (service, _db, _mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        let expired = issue_action_token(
            &service.config.auth.secret_key,
            &user.id,
            TokenAction::Reset,
            None,
            Duration::seconds(-1),
        )
        .unwrap();

        let error = service
            .reset_password("alice@example.com", &expired, "brand-new-password")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::InvalidToken));

        // Old credential still works.
        service
            .login("alice@example.com", "long-enough-pw")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn change_password_requires_current_credential() {
        let (service, _db, _mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        let wrong = service
            .change_password(&user, "not-the-password", "another-long-pw")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AppError::Validation(_)));

        service
            .change_password(&user, "long-enough-pw", "another-long-pw")
            .await
            .unwrap();
        service
            .login("alice@example.com", "another-long-pw")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn email_change_flow_updates_avatar_hash() {
        let (service, db, mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        service
            .request_email_change(&user, "Alice@New.example", "long-enough-pw")
            .await
            .unwrap();

        // Token goes to the NEW address.
        let mail = mailer.sent_to("alice@new.example");
        assert_eq!(mail.len(), 1);
        let token = mail[0].context["token"].clone();

        let updated = service.change_email(&user, &token).await.unwrap();
        assert_eq!(updated.email, "alice@new.example");
        assert_eq!(updated.avatar_hash, avatar_hash_for_email("alice@new.example"));

        let stored = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "alice@new.example");
        assert_eq!(stored.avatar_hash, updated.avatar_hash);
    }

    #[tokio::test]
    async fn change_email_rejects_claimed_address() {
        let (service, db, _mailer, _tmp) = setup().await;

        let alice = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();
        service
            .register("bob@example.com", "bob", "long-enough-pw")
            .await
            .unwrap();

        let token = issue_action_token(
            &service.config.auth.secret_key,
            &alice.id,
            TokenAction::ChangeEmail,
            Some("bob@example.com".to_string()),
            Duration::hours(1),
        )
        .unwrap();

        let error = service.change_email(&alice, &token).await.unwrap_err();
        assert!(matches!(error, AppError::Conflict(_)));

        // State untouched.
        let stored = db.get_user(&alice.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "alice@example.com");
    }

    #[tokio::test]
    async fn change_email_rejects_payload_without_address() {
        let (service, _db, _mailer, _tmp) = setup().await;

        let alice = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        let token = issue_action_token(
            &service.config.auth.secret_key,
            &alice.id,
            TokenAction::ChangeEmail,
            None,
            Duration::hours(1),
        )
        .unwrap();

        let error = service.change_email(&alice, &token).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn update_profile_persists_fields() {
        let (service, db, _mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();

        service
            .update_profile(
                &user,
                Some("Alice".to_string()),
                Some("Shanghai".to_string()),
                Some("writes things".to_string()),
            )
            .await
            .unwrap();

        let stored = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("Alice"));
        assert_eq!(stored.location.as_deref(), Some("Shanghai"));
        assert_eq!(stored.about_me.as_deref(), Some("writes things"));
    }

    #[tokio::test]
    async fn admin_update_changes_role_and_confirmation() {
        let (service, db, _mailer, _tmp) = setup().await;

        let user = service
            .register("alice@example.com", "alice", "long-enough-pw")
            .await
            .unwrap();
        let moderator = db.get_role_by_name("Moderator").await.unwrap().unwrap();

        let updated = service
            .admin_update(&user.id, "alice@example.com", "alice", true, &moderator.id)
            .await
            .unwrap();
        assert!(updated.confirmed);
        assert_eq!(updated.role_id, moderator.id);

        let bad_role = service
            .admin_update(&user.id, "alice@example.com", "alice", true, "nope")
            .await
            .unwrap_err();
        assert!(matches!(bad_role, AppError::Validation(_)));
    }
}

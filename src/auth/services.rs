use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, RegisterRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo_types::{NewUser, ProfileUpdate, User},
};
use crate::{
    error::{AppError, AppResult},
    notify::Notification,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn issue_session(state: &AppState, user_id: Uuid) -> AppResult<String> {
    let keys = JwtKeys::from(&state.config.jwt);
    Ok(keys.sign(user_id)?)
}

/// Creates the account and returns a fresh session for it.
pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<(String, User)> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::validation("Password too short"));
    }

    // The unique index still has the last word if two registrations race.
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state
        .users
        .create(
            NewUser {
                email,
                name,
                role: req.role,
                phone: non_blank(req.phone),
                address: non_blank(req.address),
                password_hash,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    let token = issue_session(state, user.id)?;
    info!(user_id = %user.id, email = %user.email, role = user.role.as_str(), "user registered");

    state.notifier.notify(
        &user.email,
        Notification::Welcome {
            name: user.name.clone(),
            role: user.role,
        },
    );
    Ok((token, user))
}

pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<(String, User)> {
    let email = normalize_email(&req.email);
    let invalid = || AppError::Unauthorized("Incorrect email or password".into());

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(invalid());
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let token = issue_session(state, user.id)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");

    state.notifier.notify(
        &user.email,
        Notification::Login {
            name: user.name.clone(),
            at: OffsetDateTime::now_utc(),
        },
    );
    Ok((token, user))
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    update: ProfileUpdate,
) -> AppResult<User> {
    if matches!(&update.name, Some(n) if n.trim().is_empty()) {
        return Err(AppError::validation("Name cannot be empty"));
    }
    let update = ProfileUpdate {
        name: update.name.map(|n| n.trim().to_string()),
        phone: update.phone.map(|p| p.trim().to_string()),
        address: update.address.map(|a| a.trim().to_string()),
    };
    state
        .users
        .update_profile(user_id, &update, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Passes the user through only when they hold the admin role.
pub fn authorize_admin(user: User) -> AppResult<User> {
    if user.is_admin() {
        Ok(user)
    } else {
        warn!(user_id = %user.id, "admin route refused");
        Err(AppError::Forbidden("Not enough permissions".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;
    use crate::test_support::{fake_state, fake_state_with_mailer, FailingMailer, RecordingMailer};
    use std::sync::Arc;

    fn register_req(email: &str, password: &str, role: Role) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            name: "Asha".into(),
            password: password.into(),
            role,
            phone: None,
            address: None,
        }
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("sp ace@x.com"));
    }

    #[tokio::test]
    async fn register_then_login_and_reject_wrong_password() {
        let state = fake_state();
        let (token, user) = register(&state, register_req("a@x.com", "pw1-secret", Role::Citizen))
            .await
            .expect("register");
        assert!(!token.is_empty());
        assert_eq!(user.role, Role::Citizen);
        assert_ne!(user.password_hash, "pw1-secret");

        let (_, same) = login(
            &state,
            LoginRequest { email: "a@x.com".into(), password: "pw1-secret".into() },
        )
        .await
        .expect("login");
        assert_eq!(same.id, user.id);

        let err = login(
            &state,
            LoginRequest { email: "a@x.com".into(), password: "wrongpw".into() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn login_unknown_email_is_unauthorized() {
        let state = fake_state();
        let err = login(
            &state,
            LoginRequest { email: "ghost@x.com".into(), password: "whatever1".into() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_and_creates_no_second_user() {
        let state = fake_state();
        register(&state, register_req("a@x.com", "pw1-secret", Role::Citizen))
            .await
            .unwrap();
        let err = register(&state, register_req("  A@X.com ", "other-pass", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_validates_input() {
        let state = fake_state();
        let err = register(&state, register_req("bad", "pw1-secret", Role::Citizen))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = register(&state, register_req("a@x.com", "short", Role::Citizen))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn welcome_and_login_mails_are_sent() {
        let mailer = Arc::new(RecordingMailer::default());
        let state = fake_state_with_mailer(mailer.clone());
        register(&state, register_req("a@x.com", "pw1-secret", Role::Admin))
            .await
            .unwrap();
        login(
            &state,
            LoginRequest { email: "a@x.com".into(), password: "pw1-secret".into() },
        )
        .await
        .unwrap();

        let sent = mailer.wait_for(2).await;
        assert!(sent.iter().all(|m| m.to == "a@x.com"));
        assert!(sent.iter().any(|m| m.subject.starts_with("Welcome")));
        assert!(sent.iter().any(|m| m.subject.starts_with("Login Notification")));
    }

    #[tokio::test]
    async fn failing_mailer_does_not_fail_register_or_login() {
        let state = fake_state_with_mailer(Arc::new(FailingMailer));
        register(&state, register_req("a@x.com", "pw1-secret", Role::Citizen))
            .await
            .expect("register despite mail failure");
        login(
            &state,
            LoginRequest { email: "a@x.com".into(), password: "pw1-secret".into() },
        )
        .await
        .expect("login despite mail failure");
    }

    #[tokio::test]
    async fn profile_update_changes_only_given_fields() {
        let state = fake_state();
        let (_, user) = register(
            &state,
            RegisterRequest {
                phone: Some("555-0100".into()),
                ..register_req("a@x.com", "pw1-secret", Role::Citizen)
            },
        )
        .await
        .unwrap();

        let updated = update_profile(
            &state,
            user.id,
            ProfileUpdate { address: Some("12 Main St".into()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Asha");
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.address.as_deref(), Some("12 Main St"));
        assert!(updated.updated_at >= user.updated_at);

        let err = update_profile(&state, Uuid::new_v4(), ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn authorize_admin_checks_role() {
        let state = fake_state();
        let (_, citizen) = register(&state, register_req("c@x.com", "pw1-secret", Role::Citizen))
            .await
            .unwrap();
        let (_, admin) = register(&state, register_req("a@x.com", "pw1-secret", Role::Admin))
            .await
            .unwrap();
        assert!(matches!(authorize_admin(citizen), Err(AppError::Forbidden(_))));
        assert_eq!(authorize_admin(admin.clone()).unwrap().id, admin.id);
    }
}

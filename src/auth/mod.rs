//! Credentials, registration and account security settings.

mod session;

pub use session::{MAX_OTP_ATTEMPTS, OTP_TTL_MINUTES, SessionManager};

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AdminCredential, SecurityConfig};
use crate::core::{
    Account, AccountType, Preferences, Role, Security, Transaction, TransactionKind, User,
    UserStatus, validate,
};
use crate::error::{Error, Result};
use crate::store::JsonStore;

pub const MIN_INITIAL_DEPOSIT: f64 = 1_000.0;
const TEMP_PASSWORD_LENGTH: usize = 10;

/// Salted SHA-256 in the `<salt>$<hex digest>` layout.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    !salt.is_empty() && digest(salt, password) == expected
}

pub fn is_password_hash(stored: &str) -> bool {
    stored.split_once('$').is_some_and(|(salt, hash)| {
        !salt.is_empty() && hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
    })
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn verify_otp(given: &str, expected: &str) -> bool {
    !expected.is_empty() && given.trim() == expected
}

/// Stand-in for the OTP email; the code only goes to the server log.
pub fn send_otp(email: &str, otp: &str) {
    info!(email, otp, "simulated OTP email");
}

fn temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Checks credentials and maintains the failed-attempt lockout.
pub fn login(
    store: &JsonStore,
    email: &str,
    password: &str,
    policy: &SecurityConfig,
    now: DateTime<Utc>,
) -> Result<User> {
    let mut user = store
        .find_by_email(email)?
        .ok_or(Error::InvalidCredentials)?;

    if user.security.login_attempts >= policy.max_login_attempts {
        let last_attempt = user.security.last_attempt.unwrap_or(now);
        if now - last_attempt < policy.lockout() {
            warn!(user_id = %user.user_id, "login refused: account locked");
            return Err(Error::AccountLocked);
        }
        user.security.login_attempts = 0;
    }

    if !verify_password(password, &user.password) {
        user.security.login_attempts += 1;
        user.security.last_attempt = Some(now);
        store.save_user(&user)?;
        warn!(
            user_id = %user.user_id,
            attempts = user.security.login_attempts,
            "login failed: bad password"
        );
        return Err(Error::InvalidCredentials);
    }

    if user.status == UserStatus::Blocked {
        warn!(user_id = %user.user_id, "login refused: account blocked");
        return Err(Error::AccountBlocked);
    }

    user.security.login_attempts = 0;
    user.security.last_login = Some(now);
    store.save_user(&user)?;
    Ok(user)
}

pub fn admin_login(credentials: &[AdminCredential], username: &str, password: &str) -> Result<()> {
    credentials
        .iter()
        .find(|c| c.username == username)
        .filter(|c| verify_password(password, &c.password_hash))
        .map(|_| ())
        .ok_or(Error::InvalidCredentials)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub dob: NaiveDate,
    pub pan: String,
    pub aadhar: String,
    pub address: String,
    #[serde(default)]
    pub account_type: AccountType,
    pub initial_deposit: f64,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl RegistrationForm {
    /// Reports the first problem, checking fields in form order.
    pub fn validate(&self, min_password_length: usize) -> Result<()> {
        validate::required(&[
            ("Full Name", self.full_name.as_str()),
            ("Email", self.email.as_str()),
            ("Phone Number", self.phone.as_str()),
            ("Address", self.address.as_str()),
            ("PAN Number", self.pan.as_str()),
            ("Aadhar Number", self.aadhar.as_str()),
            ("Password", self.password.as_str()),
            ("Confirm Password", self.confirm_password.as_str()),
        ])?;
        validate::email(self.email.trim())?;
        validate::phone(self.phone.trim())?;
        validate::pan(self.pan.trim())?;
        validate::aadhar(self.aadhar.trim())?;
        validate::password(&self.password, &self.confirm_password, min_password_length)?;
        if !self.initial_deposit.is_finite() || self.initial_deposit < MIN_INITIAL_DEPOSIT {
            return Err(Error::validation(format!(
                "Initial deposit must be at least {MIN_INITIAL_DEPOSIT:.0}"
            )));
        }
        if !self.terms_accepted {
            return Err(Error::validation(
                "Please agree to the terms and conditions",
            ));
        }
        Ok(())
    }
}

/// Creates a user with one funded account.
pub fn register(
    store: &JsonStore,
    form: RegistrationForm,
    policy: &SecurityConfig,
    now: DateTime<Utc>,
) -> Result<User> {
    form.validate(policy.min_password_length)?;

    let existing = store.all_users()?;
    let email = form.email.trim().to_string();
    if existing.iter().any(|u| u.email.eq_ignore_ascii_case(&email)) {
        return Err(Error::conflict("Email already registered"));
    }

    let account_number = loop {
        let candidate = format!("NB{}", rand::thread_rng().gen_range(10_000_000..=99_999_999u32));
        if existing.iter().all(|u| u.account_index(&candidate).is_none()) {
            break candidate;
        }
    };

    let user = User {
        user_id: Uuid::new_v4().to_string(),
        full_name: form.full_name.trim().to_string(),
        email,
        phone: form.phone.trim().to_string(),
        dob: form.dob,
        pan: form.pan.trim().to_string(),
        aadhar: form.aadhar.trim().to_string(),
        address: form.address.trim().to_string(),
        password: hash_password(&form.password),
        created_at: now,
        accounts: vec![Account {
            account_number,
            account_type: form.account_type,
            balance: form.initial_deposit,
            created_at: now,
            status: "Active".to_string(),
            transactions: vec![Transaction {
                transaction_id: Uuid::new_v4().to_string(),
                kind: TransactionKind::Credit,
                amount: form.initial_deposit,
                description: "Initial deposit".to_string(),
                timestamp: now,
                balance_after: form.initial_deposit,
                reference: None,
            }],
        }],
        loans: Vec::new(),
        security: Security {
            last_password_change: Some(now),
            ..Security::default()
        },
        preferences: Preferences::default(),
        role: Role::User,
        status: UserStatus::Active,
    };
    store.save_user(&user)?;
    info!(user_id = %user.user_id, "registered new user");
    Ok(user)
}

/// Replaces the password with a random temporary one and returns it.
pub fn reset_password(store: &JsonStore, email: &str, now: DateTime<Utc>) -> Result<String> {
    let user = store.find_by_email(email)?.ok_or(Error::UserNotFound)?;
    let temp = temporary_password();
    store.atomic_transaction(&user.user_id, |user| {
        user.password = hash_password(&temp);
        user.security.password_reset = true;
        user.security.last_password_change = Some(now);
        Ok(())
    })?;
    info!(email = %user.email, temporary_password = %temp, "simulated password reset email");
    Ok(temp)
}

pub fn change_password(
    store: &JsonStore,
    user_id: &str,
    current: &str,
    new: &str,
    policy: &SecurityConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    validate::new_password(new, policy.min_password_length)?;
    store.atomic_transaction(user_id, |user| {
        if !verify_password(current, &user.password) {
            return Err(Error::IncorrectPassword);
        }
        user.password = hash_password(new);
        user.security.last_password_change = Some(now);
        user.security.password_reset = false;
        Ok(())
    })
}

pub fn set_two_factor(store: &JsonStore, user_id: &str, enabled: bool) -> Result<()> {
    store.atomic_transaction(user_id, |user| {
        user.security.two_factor_enabled = enabled;
        Ok(())
    })
}

pub fn update_preferences(
    store: &JsonStore,
    user_id: &str,
    preferences: Preferences,
) -> Result<Preferences> {
    store.atomic_transaction(user_id, |user| {
        user.preferences = preferences;
        Ok(user.preferences.clone())
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_form(email: &str) -> RegistrationForm {
        RegistrationForm {
            full_name: "Asha Rao".to_string(),
            email: email.to_string(),
            phone: "9876543210".to_string(),
            dob: NaiveDate::from_ymd_opt(1990, 4, 12).expect("valid date"),
            pan: "ABCDE1234F".to_string(),
            aadhar: "123412341234".to_string(),
            address: "12 MG Road, Pune".to_string(),
            account_type: AccountType::Savings,
            initial_deposit: 5_000.0,
            password: "correct horse".to_string(),
            confirm_password: "correct horse".to_string(),
            terms_accepted: true,
        }
    }

    fn temp_store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path()).expect("store opens");
        (dir, store)
    }

    #[test]
    fn password_hash_verifies_and_is_salted() {
        let a = hash_password("hunter22");
        let b = hash_password("hunter22");
        assert_ne!(a, b);
        assert!(verify_password("hunter22", &a));
        assert!(verify_password("hunter22", &b));
        assert!(!verify_password("hunter23", &a));
        assert!(is_password_hash(&a));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "no-separator"));
        assert!(!verify_password("x", "$abc"));
        assert!(!is_password_hash("123"));
    }

    #[test]
    fn otp_has_requested_length_and_digits() {
        let otp = generate_otp(6);
        assert_eq!(otp.len(), 6);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
        assert!(verify_otp(&format!(" {otp} "), &otp));
        assert!(!verify_otp("", ""));
    }

    #[test]
    fn registration_creates_funded_primary_account() {
        let (_dir, store) = temp_store();
        let user = register(
            &store,
            sample_form("asha@example.com"),
            &SecurityConfig::default(),
            Utc::now(),
        )
        .expect("registration succeeds");

        let account = user.primary_account().expect("primary account");
        assert!(account.account_number.starts_with("NB"));
        assert_eq!(account.account_number.len(), 10);
        assert_eq!(account.balance, 5_000.0);
        assert_eq!(account.transactions[0].description, "Initial deposit");
        assert!(verify_password("correct horse", &user.password));
        assert!(store.load_user(&user.user_id).expect("load").is_some());
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (_dir, store) = temp_store();
        let policy = SecurityConfig::default();
        register(&store, sample_form("asha@example.com"), &policy, Utc::now()).expect("first");
        let err = register(&store, sample_form("ASHA@example.com"), &policy, Utc::now())
            .expect_err("duplicate");
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn registration_validation_order() {
        let policy = SecurityConfig::default();
        let mut form = sample_form("bad-email");
        form.phone = "12".to_string();
        let err = form.validate(policy.min_password_length).expect_err("invalid");
        assert_eq!(err.to_string(), "Invalid email format");

        let mut form = sample_form("asha@example.com");
        form.initial_deposit = 500.0;
        assert!(form.validate(8).is_err());

        let mut form = sample_form("asha@example.com");
        form.terms_accepted = false;
        let err = form.validate(8).expect_err("terms");
        assert!(err.to_string().contains("terms"));
    }

    #[test]
    fn lockout_after_repeated_failures_then_expires() {
        let (_dir, store) = temp_store();
        let policy = SecurityConfig::default();
        let start = Utc::now();
        register(&store, sample_form("asha@example.com"), &policy, start).expect("register");

        for _ in 0..policy.max_login_attempts {
            let err = login(&store, "asha@example.com", "wrong", &policy, start)
                .expect_err("bad password");
            assert!(matches!(err, Error::InvalidCredentials));
        }
        let err = login(&store, "asha@example.com", "correct horse", &policy, start)
            .expect_err("locked");
        assert!(matches!(err, Error::AccountLocked));

        let later = start + Duration::minutes(31);
        let user = login(&store, "asha@example.com", "correct horse", &policy, later)
            .expect("lock window passed");
        assert_eq!(user.security.login_attempts, 0);
        assert_eq!(user.security.last_login, Some(later));
    }

    #[test]
    fn unknown_email_is_indistinguishable_from_bad_password() {
        let (_dir, store) = temp_store();
        let err = login(&store, "nobody@example.com", "x", &SecurityConfig::default(), Utc::now())
            .expect_err("unknown");
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[test]
    fn blocked_user_cannot_log_in() {
        let (_dir, store) = temp_store();
        let policy = SecurityConfig::default();
        let user = register(&store, sample_form("asha@example.com"), &policy, Utc::now())
            .expect("register");
        store
            .atomic_transaction(&user.user_id, |u| {
                u.status = UserStatus::Blocked;
                Ok(())
            })
            .expect("block");
        let err = login(&store, "asha@example.com", "correct horse", &policy, Utc::now())
            .expect_err("blocked");
        assert!(matches!(err, Error::AccountBlocked));

        let reloaded = store.load_user(&user.user_id).expect("load").expect("present");
        assert!(reloaded.security.last_login.is_none());
        assert_eq!(reloaded.security, user.security);
    }

    #[test]
    fn reset_then_change_password() {
        let (_dir, store) = temp_store();
        let policy = SecurityConfig::default();
        let user = register(&store, sample_form("asha@example.com"), &policy, Utc::now())
            .expect("register");

        let temp = reset_password(&store, "asha@example.com", Utc::now()).expect("reset");
        assert_eq!(temp.len(), 10);
        let reloaded = store.load_user(&user.user_id).expect("load").expect("present");
        assert!(reloaded.security.password_reset);
        assert!(verify_password(&temp, &reloaded.password));

        let err = change_password(&store, &user.user_id, "wrong", "new password", &policy, Utc::now())
            .expect_err("wrong current");
        assert!(matches!(err, Error::IncorrectPassword));
        let err = change_password(&store, &user.user_id, &temp, "short", &policy, Utc::now())
            .expect_err("too short");
        assert!(matches!(err, Error::Validation(_)));

        change_password(&store, &user.user_id, &temp, "new password", &policy, Utc::now())
            .expect("change");
        let reloaded = store.load_user(&user.user_id).expect("load").expect("present");
        assert!(!reloaded.security.password_reset);
        assert!(verify_password("new password", &reloaded.password));
    }

    #[test]
    fn reset_for_unknown_email_fails() {
        let (_dir, store) = temp_store();
        let err = reset_password(&store, "ghost@example.com", Utc::now()).expect_err("unknown");
        assert!(matches!(err, Error::UserNotFound));
    }

    #[test]
    fn two_factor_toggle_persists() {
        let (_dir, store) = temp_store();
        let user = register(
            &store,
            sample_form("asha@example.com"),
            &SecurityConfig::default(),
            Utc::now(),
        )
        .expect("register");
        set_two_factor(&store, &user.user_id, true).expect("enable");
        let reloaded = store.load_user(&user.user_id).expect("load").expect("present");
        assert!(reloaded.security.two_factor_enabled);
    }

    #[test]
    fn admin_login_checks_configured_hashes() {
        let credentials = vec![AdminCredential {
            username: "ops".to_string(),
            password_hash: hash_password("admin-pass"),
        }];
        assert!(admin_login(&credentials, "ops", "admin-pass").is_ok());
        assert!(admin_login(&credentials, "ops", "nope").is_err());
        assert!(admin_login(&credentials, "other", "admin-pass").is_err());
        assert!(admin_login(&[], "ops", "admin-pass").is_err());
    }
}

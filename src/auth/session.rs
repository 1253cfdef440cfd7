use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const OTP_TTL_MINUTES: i64 = 5;
/// Wrong codes allowed before a pending login is discarded.
pub const MAX_OTP_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
struct Session {
    subject: String,
    last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingOtp {
    user_id: String,
    otp: String,
    issued: DateTime<Utc>,
    attempts: u32,
}

/// In-memory bearer tokens for users, admins and half-finished 2FA logins.
#[derive(Debug)]
pub struct SessionManager {
    idle_timeout: Duration,
    users: HashMap<String, Session>,
    admins: HashMap<String, Session>,
    pending: HashMap<String, PendingOtp>,
}

impl SessionManager {
    pub fn new(idle_timeout: std::time::Duration) -> Self {
        Self {
            idle_timeout: Duration::from_std(idle_timeout).unwrap_or(Duration::minutes(30)),
            users: HashMap::new(),
            admins: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn create(&mut self, user_id: &str, now: DateTime<Utc>) -> String {
        self.purge(now);
        insert(&mut self.users, user_id, now)
    }

    /// Resolves a token to its user id and slides the idle window forward.
    pub fn touch(&mut self, token: &str, now: DateTime<Utc>) -> Result<String> {
        touch(&mut self.users, token, self.idle_timeout, now)
    }

    pub fn remove(&mut self, token: &str) -> Option<String> {
        self.users.remove(token).map(|s| s.subject)
    }

    /// Drops every session belonging to `user_id`, e.g. when the user is blocked.
    pub fn revoke_user(&mut self, user_id: &str) {
        self.users.retain(|_, s| s.subject != user_id);
        self.pending.retain(|_, p| p.user_id != user_id);
    }

    pub fn create_admin(&mut self, username: &str, now: DateTime<Utc>) -> String {
        self.purge(now);
        insert(&mut self.admins, username, now)
    }

    pub fn check_admin(&mut self, token: &str, now: DateTime<Utc>) -> Result<String> {
        touch(&mut self.admins, token, self.idle_timeout, now)
    }

    pub fn remove_admin(&mut self, token: &str) -> Option<String> {
        self.admins.remove(token).map(|s| s.subject)
    }

    pub fn begin_otp(&mut self, user_id: &str, otp: String, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        self.pending.insert(
            token.clone(),
            PendingOtp {
                user_id: user_id.to_string(),
                otp,
                issued: now,
                attempts: 0,
            },
        );
        token
    }

    /// Replaces the code of a pending login and restarts its validity window.
    pub fn resend_otp(&mut self, token: &str, otp: String, now: DateTime<Utc>) -> Result<String> {
        let pending = self.pending.get_mut(token).ok_or(Error::Unauthorized)?;
        pending.otp = otp;
        pending.issued = now;
        pending.attempts = 0;
        Ok(pending.user_id.clone())
    }

    /// Finishes a 2FA login. A wrong code keeps the pending login alive
    /// until [`MAX_OTP_ATTEMPTS`] codes have been rejected.
    pub fn complete_otp(&mut self, token: &str, given: &str, now: DateTime<Utc>) -> Result<String> {
        let pending = self.pending.get_mut(token).ok_or(Error::Unauthorized)?;
        if now - pending.issued > Duration::minutes(OTP_TTL_MINUTES) {
            self.pending.remove(token);
            return Err(Error::SessionExpired);
        }
        if !super::verify_otp(given, &pending.otp) {
            pending.attempts += 1;
            if pending.attempts >= MAX_OTP_ATTEMPTS {
                self.pending.remove(token);
            }
            return Err(Error::InvalidOtp);
        }
        let user_id = pending.user_id.clone();
        self.pending.remove(token);
        Ok(user_id)
    }

    pub fn cancel_otp(&mut self, token: &str) -> bool {
        self.pending.remove(token).is_some()
    }

    fn purge(&mut self, now: DateTime<Utc>) {
        let idle = self.idle_timeout;
        self.users.retain(|_, s| now - s.last_activity <= idle);
        self.admins.retain(|_, s| now - s.last_activity <= idle);
        self.pending
            .retain(|_, p| now - p.issued <= Duration::minutes(OTP_TTL_MINUTES));
    }
}

fn insert(map: &mut HashMap<String, Session>, subject: &str, now: DateTime<Utc>) -> String {
    let token = Uuid::new_v4().to_string();
    map.insert(
        token.clone(),
        Session {
            subject: subject.to_string(),
            last_activity: now,
        },
    );
    token
}

fn touch(
    map: &mut HashMap<String, Session>,
    token: &str,
    idle: Duration,
    now: DateTime<Utc>,
) -> Result<String> {
    let session = map.get_mut(token).ok_or(Error::Unauthorized)?;
    if now - session.last_activity > idle {
        map.remove(token);
        return Err(Error::SessionExpired);
    }
    session.last_activity = now;
    Ok(session.subject.clone())
}

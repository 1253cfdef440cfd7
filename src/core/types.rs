use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Naive layouts found in files written without a UTC offset.
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Reads RFC 3339 timestamps, falling back to offset-less layouts taken as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum UserStatus {
    #[default]
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "blocked")]
    Blocked,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum AccountType {
    #[default]
    Savings,
    Current,
    Salary,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub balance_after: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Transaction {
    /// Signed effect on the balance: credits positive, debits negative.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionKind::Credit => self.amount,
            TransactionKind::Debit => -self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_account_status")]
    pub status: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

fn default_account_status() -> String {
    "Active".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Loan {
    #[serde(default)]
    pub loan_id: String,
    #[serde(rename = "type")]
    pub loan_type: String,
    pub amount: f64,
    pub interest_rate: f64,
    pub term_months: u32,
    pub emi: f64,
    #[serde(default)]
    pub status: LoanStatus,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Security {
    #[serde(rename = "2fa_enabled")]
    pub two_factor_enabled: bool,
    pub login_attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_password_change: Option<DateTime<Utc>>,
    pub password_reset: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
    pub notifications: NotificationPreferences,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub dob: NaiveDate,
    pub pan: String,
    pub aadhar: String,
    pub address: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub loans: Vec<Loan>,
    #[serde(default)]
    pub security: Security,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,
}

impl User {
    pub fn primary_account(&self) -> Option<&Account> {
        self.accounts.first()
    }

    pub fn total_balance(&self) -> f64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or("")
    }

    pub fn account_index(&self, account_number: &str) -> Option<usize> {
        self.accounts
            .iter()
            .position(|a| a.account_number == account_number)
    }
}

/// A user record as shown to clients: everything except the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub dob: NaiveDate,
    pub pan: String,
    pub aadhar: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub loans: Vec<Loan>,
    pub security: Security,
    pub preferences: Preferences,
    pub role: Role,
    pub status: UserStatus,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            full_name: user.full_name,
            email: user.email,
            phone: user.phone,
            dob: user.dob,
            pan: user.pan,
            aadhar: user.aadhar,
            address: user.address,
            created_at: user.created_at,
            accounts: user.accounts,
            loans: user.loans,
            security: user.security,
            preferences: user.preferences,
            role: user.role,
            status: user.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContactMessage {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContactMessages {
    #[serde(default)]
    pub messages: Vec<ContactMessage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActivityEntry {
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub activity_type: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

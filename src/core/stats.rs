use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Transaction, TransactionKind, User, UserStatus};

const RECENT_LABEL_MAX: usize = 15;
const RECENT_LABEL_KEEP: usize = 12;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    #[default]
    All,
    Credit,
    Debit,
}

impl TypeFilter {
    pub fn matches(self, kind: TransactionKind) -> bool {
        match self {
            Self::All => true,
            Self::Credit => kind == TransactionKind::Credit,
            Self::Debit => kind == TransactionKind::Debit,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    #[serde(alias = "newestFirst", alias = "newest")]
    NewestFirst,
    #[serde(alias = "oldestFirst", alias = "oldest")]
    OldestFirst,
    #[serde(alias = "amountHighToLow", alias = "amount-desc")]
    AmountHighToLow,
    #[serde(alias = "amountLowToHigh", alias = "amount-asc")]
    AmountLowToHigh,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub total_credits: f64,
    pub total_debits: f64,
    pub credit_count: usize,
    pub debit_count: usize,
    pub net: f64,
    pub credit_share_percent: f64,
    pub debit_share_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentBar {
    pub label: String,
    pub amount: f64,
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFlow {
    pub month: String,
    pub credits: f64,
    pub debits: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    pub total_users: usize,
    pub active_users: usize,
    pub blocked_users: usize,
    pub total_accounts: usize,
    pub total_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub account_number: Option<String>,
    pub balance: f64,
    pub status: UserStatus,
    pub joined: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.full_name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            account_number: user.primary_account().map(|a| a.account_number.clone()),
            balance: user.total_balance(),
            status: user.status,
            joined: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserFilter {
    pub q: Option<String>,
    pub status: Option<UserStatus>,
}

/// Preset windows for the transaction monitor. `Custom` uses the explicit
/// `from`/`to` bounds only.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateRange {
    #[default]
    #[serde(alias = "all-time")]
    All,
    Today,
    #[serde(rename = "last-7-days", alias = "7d")]
    Last7Days,
    #[serde(rename = "last-30-days", alias = "30d")]
    Last30Days,
    Custom,
}

impl DateRange {
    /// Earliest calendar day the preset admits, relative to `today`.
    fn start(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::All | Self::Custom => None,
            Self::Today => Some(today),
            Self::Last7Days => Some(today - Duration::days(7)),
            Self::Last30Days => Some(today - Duration::days(30)),
        }
    }
}

/// Admin transaction monitor criteria. Date bounds are inclusive calendar
/// days; amount bounds only apply when positive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorFilter {
    #[serde(rename = "type")]
    pub kind: TypeFilter,
    pub q: Option<String>,
    pub range: DateRange,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

impl MonitorFilter {
    fn window(&self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self.range {
            DateRange::Custom => (self.from, self.to),
            preset => (preset.start(today), None),
        }
    }

    fn admits_amount(&self, amount: f64) -> bool {
        let above = self.min_amount.filter(|m| *m > 0.0).is_none_or(|m| amount >= m);
        let below = self.max_amount.filter(|m| *m > 0.0).is_none_or(|m| amount <= m);
        above && below
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredTransaction {
    pub user_id: String,
    pub user_name: String,
    pub account_number: String,
    #[serde(flatten)]
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMonitor {
    pub summary: TransactionSummary,
    pub transactions: Vec<MonitoredTransaction>,
}

pub fn filter_and_sort(
    transactions: &[Transaction],
    filter: TypeFilter,
    order: SortOrder,
) -> Vec<Transaction> {
    let mut selected: Vec<Transaction> = transactions
        .iter()
        .filter(|t| filter.matches(t.kind))
        .cloned()
        .collect();
    match order {
        SortOrder::NewestFirst => selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
        SortOrder::OldestFirst => selected.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
        SortOrder::AmountHighToLow => selected.sort_by(|a, b| b.amount.total_cmp(&a.amount)),
        SortOrder::AmountLowToHigh => selected.sort_by(|a, b| a.amount.total_cmp(&b.amount)),
    }
    selected
}

pub fn summarize<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> TransactionSummary {
    let mut summary = TransactionSummary::default();
    for t in transactions {
        match t.kind {
            TransactionKind::Credit => {
                summary.total_credits += t.amount;
                summary.credit_count += 1;
            }
            TransactionKind::Debit => {
                summary.total_debits += t.amount;
                summary.debit_count += 1;
            }
        }
    }
    summary.net = summary.total_credits - summary.total_debits;
    let gross = summary.total_credits + summary.total_debits;
    if gross > 0.0 {
        summary.credit_share_percent = summary.total_credits / gross * 100.0;
        summary.debit_share_percent = summary.total_debits / gross * 100.0;
    }
    summary
}

pub fn recent_bars(transactions: &[Transaction], limit: usize) -> Vec<RecentBar> {
    filter_and_sort(transactions, TypeFilter::All, SortOrder::NewestFirst)
        .into_iter()
        .take(limit)
        .map(|t| RecentBar {
            label: short_label(&t.description),
            amount: t.signed_amount(),
            kind: t.kind,
        })
        .collect()
}

fn short_label(description: &str) -> String {
    if description.chars().count() > RECENT_LABEL_MAX {
        let head: String = description.chars().take(RECENT_LABEL_KEEP).collect();
        format!("{head}...")
    } else {
        description.to_string()
    }
}

pub fn monthly_flow(transactions: &[Transaction]) -> Vec<MonthlyFlow> {
    let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for t in transactions {
        let entry = months
            .entry(t.timestamp.format("%Y-%m").to_string())
            .or_default();
        match t.kind {
            TransactionKind::Credit => entry.0 += t.amount,
            TransactionKind::Debit => entry.1 += t.amount,
        }
    }
    months
        .into_iter()
        .map(|(month, (credits, debits))| MonthlyFlow {
            month,
            credits,
            debits,
        })
        .collect()
}

pub fn user_overview(users: &[User]) -> UserOverview {
    UserOverview {
        total_users: users.len(),
        active_users: users
            .iter()
            .filter(|u| u.status == UserStatus::Active)
            .count(),
        blocked_users: users
            .iter()
            .filter(|u| u.status == UserStatus::Blocked)
            .count(),
        total_accounts: users.iter().map(|u| u.accounts.len()).sum(),
        total_balance: users.iter().map(User::total_balance).sum(),
    }
}

pub fn matches_query(query: Option<&str>, fields: &[&str]) -> bool {
    let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return true;
    };
    let needle = query.to_lowercase();
    fields.iter().any(|f| f.to_lowercase().contains(&needle))
}

pub fn user_summaries(users: &[User], filter: &UserFilter) -> Vec<UserSummary> {
    users
        .iter()
        .filter(|u| filter.status.is_none_or(|s| u.status == s))
        .filter(|u| {
            matches_query(
                filter.q.as_deref(),
                &[u.full_name.as_str(), u.email.as_str(), u.phone.as_str()],
            )
        })
        .map(UserSummary::from)
        .collect()
}

/// Every account transaction across `users` that passes `filter`, newest
/// first, with totals over the selection.
pub fn monitor_transactions(
    users: &[User],
    filter: &MonitorFilter,
    today: NaiveDate,
) -> TransactionMonitor {
    let (from, to) = filter.window(today);
    let in_window = |t: &Transaction| {
        let day = t.timestamp.date_naive();
        from.is_none_or(|f| day >= f) && to.is_none_or(|l| day <= l)
    };
    let mut rows = Vec::new();
    for user in users {
        for account in &user.accounts {
            let selected = account.transactions.iter().filter(|t| {
                filter.kind.matches(t.kind) && in_window(t) && filter.admits_amount(t.amount)
            });
            for t in selected {
                if !matches_query(
                    filter.q.as_deref(),
                    &[
                        user.full_name.as_str(),
                        account.account_number.as_str(),
                        t.description.as_str(),
                    ],
                ) {
                    continue;
                }
                rows.push(MonitoredTransaction {
                    user_id: user.user_id.clone(),
                    user_name: user.full_name.clone(),
                    account_number: account.account_number.clone(),
                    transaction: t.clone(),
                });
            }
        }
    }
    rows.sort_by(|a, b| b.transaction.timestamp.cmp(&a.transaction.timestamp));
    TransactionMonitor {
        summary: summarize(rows.iter().map(|r| &r.transaction)),
        transactions: rows,
    }
}

//! Bank oversight: user management, transaction monitoring, loan decisions
//! and the contact inbox.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::core::stats::{
    MonitorFilter, TransactionMonitor, UserFilter, UserOverview, UserSummary, matches_query,
    monitor_transactions, user_overview, user_summaries,
};
use crate::core::{ContactMessage, Loan, LoanStatus, PublicUser, UserStatus, update_loan_status, validate};
use crate::error::{Error, Result};
use crate::store::JsonStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub terms_accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub users: UserOverview,
    pub pending_loans: usize,
    pub contact_messages: usize,
}

pub fn overview(store: &JsonStore) -> Result<Overview> {
    let users = store.all_users()?;
    let pending_loans = users
        .iter()
        .flat_map(|u| &u.loans)
        .filter(|l| l.status == LoanStatus::Pending)
        .count();
    Ok(Overview {
        users: user_overview(&users),
        pending_loans,
        contact_messages: store.contact_messages()?.len(),
    })
}

const USERS_CSV_HEADER: [&str; 8] = [
    "user_id",
    "name",
    "email",
    "phone",
    "account_number",
    "balance",
    "status",
    "joined",
];

pub fn list_users(store: &JsonStore, filter: &UserFilter) -> Result<Vec<UserSummary>> {
    Ok(user_summaries(&store.all_users()?, filter))
}

/// The filtered user table as CSV, header row first.
pub fn users_csv(store: &JsonStore, filter: &UserFilter) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(USERS_CSV_HEADER)?;
    for user in list_users(store, filter)? {
        let balance = format!("{:.2}", user.balance);
        let joined = user.joined.format("%Y-%m-%d %H:%M:%S").to_string();
        let status = match user.status {
            UserStatus::Active => "Active",
            UserStatus::Blocked => "Blocked",
        };
        writer.write_record([
            user.user_id.as_str(),
            user.name.as_str(),
            user.email.as_str(),
            user.phone.as_str(),
            user.account_number.as_deref().unwrap_or(""),
            balance.as_str(),
            status,
            joined.as_str(),
        ])?;
    }
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

pub fn user_detail(store: &JsonStore, user_id: &str) -> Result<PublicUser> {
    store
        .load_user(user_id)?
        .map(PublicUser::from)
        .ok_or(Error::UserNotFound)
}

/// Blocks or reactivates a user. The caller is expected to drop the
/// sessions of a user that has just been blocked.
pub fn set_user_status(
    store: &JsonStore,
    user_id: &str,
    status: UserStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    store.atomic_transaction(user_id, |user| {
        user.status = status;
        Ok(())
    })?;
    store.log_activity(user_id, "status_change", json!({ "status": status }), now);
    info!(user_id, ?status, "user status changed");
    Ok(())
}

pub fn transactions(
    store: &JsonStore,
    filter: &MonitorFilter,
    today: NaiveDate,
) -> Result<TransactionMonitor> {
    Ok(monitor_transactions(&store.all_users()?, filter, today))
}

/// Inbox contents, newest first.
pub fn contact_messages(store: &JsonStore, query: Option<&str>) -> Result<Vec<ContactMessage>> {
    let mut messages: Vec<ContactMessage> = store
        .contact_messages()?
        .into_iter()
        .filter(|m| {
            matches_query(
                query,
                &[
                    m.full_name.as_str(),
                    m.email.as_str(),
                    m.subject.as_str(),
                    m.message.as_str(),
                ],
            )
        })
        .collect();
    messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(messages)
}

pub fn submit_contact(store: &JsonStore, form: ContactForm, now: DateTime<Utc>) -> Result<()> {
    validate::required(&[
        ("Full name", form.full_name.as_str()),
        ("Email", form.email.as_str()),
        ("Message", form.message.as_str()),
    ])?;
    validate::email(&form.email)?;
    if !form.phone.trim().is_empty() {
        validate::phone(&form.phone)?;
    }
    if !form.terms_accepted {
        return Err(Error::validation(
            "Please agree to our privacy policy and terms of service.",
        ));
    }
    store.append_contact_message(ContactMessage {
        full_name: form.full_name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
        subject: form.subject.trim().to_string(),
        message: form.message.trim().to_string(),
        timestamp: now,
    })
}

/// Approves or rejects a loan. Approval credits the principal to the
/// borrower's primary account exactly once.
pub fn set_loan_status(
    store: &JsonStore,
    user_id: &str,
    loan_id: &str,
    status: LoanStatus,
    now: DateTime<Utc>,
) -> Result<Loan> {
    let loan =
        store.atomic_transaction(user_id, |user| update_loan_status(user, loan_id, status, now))?;
    store.log_activity(
        user_id,
        "loan_status",
        json!({ "loan_id": loan_id, "status": status }),
        now,
    );
    info!(user_id, loan_id, ?status, "loan status updated");
    Ok(loan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{LoanApplication, apply_for_loan};
    use crate::core::TermUnit;
    use crate::core::ledger::tests::sample_user;
    use crate::core::stats::{DateRange, TypeFilter};
    use chrono::Duration;

    fn setup() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path()).expect("store opens");
        store.save_user(&sample_user(2_000.0)).expect("save");
        (dir, store)
    }

    fn form(name: &str, message: &str) -> ContactForm {
        ContactForm {
            full_name: name.to_string(),
            email: "visitor@example.com".to_string(),
            phone: String::new(),
            subject: "Card".to_string(),
            message: message.to_string(),
            terms_accepted: true,
        }
    }

    #[test]
    fn user_detail_omits_password() {
        let (_dir, store) = setup();
        let detail = user_detail(&store, "user-1").expect("detail");
        let value = serde_json::to_value(&detail).expect("serialize");
        assert!(value.get("password").is_none());
        assert_eq!(value["email"], "asha@example.com");
        assert!(matches!(
            user_detail(&store, "missing"),
            Err(Error::UserNotFound)
        ));
    }

    #[test]
    fn blocking_shows_in_listing_and_overview() {
        let (_dir, store) = setup();
        set_user_status(&store, "user-1", UserStatus::Blocked, Utc::now()).expect("block");

        let blocked = list_users(
            &store,
            &UserFilter {
                q: None,
                status: Some(UserStatus::Blocked),
            },
        )
        .expect("list");
        assert_eq!(blocked.len(), 1);

        let summary = overview(&store).expect("overview");
        assert_eq!(summary.users.blocked_users, 1);
        assert_eq!(summary.users.active_users, 0);
    }

    #[test]
    fn approving_twice_disburses_once() {
        let (_dir, store) = setup();
        let loan = apply_for_loan(
            &store,
            "user-1",
            &LoanApplication {
                loan_type: "Home".to_string(),
                amount: 100_000.0,
                interest_rate: 8.5,
                term: 10.0,
                term_unit: TermUnit::Years,
            },
            Utc::now(),
        )
        .expect("apply");
        assert_eq!(overview(&store).expect("overview").pending_loans, 1);

        for _ in 0..2 {
            set_loan_status(&store, "user-1", &loan.loan_id, LoanStatus::Approved, Utc::now())
                .expect("approve");
        }
        let user = store.load_user("user-1").expect("load").expect("present");
        assert_eq!(user.accounts[0].balance, 102_000.0);
        assert_eq!(user.loans[0].status, LoanStatus::Approved);
        assert!(matches!(
            set_loan_status(&store, "user-1", "nope", LoanStatus::Rejected, Utc::now()),
            Err(Error::LoanNotFound)
        ));
    }

    #[test]
    fn contact_inbox_is_newest_first_and_searchable() {
        let (_dir, store) = setup();
        let now = Utc::now();
        submit_contact(&store, form("Ravi", "Lost my card"), now - Duration::hours(1))
            .expect("submit");
        submit_contact(&store, form("Meera", "Statement request"), now).expect("submit");

        let all = contact_messages(&store, None).expect("inbox");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].full_name, "Meera");

        let found = contact_messages(&store, Some("CARD")).expect("inbox");
        assert!(found.iter().all(|m| m.subject == "Card"));
        let found = contact_messages(&store, Some("statement")).expect("inbox");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn contact_form_requires_valid_fields() {
        let (_dir, store) = setup();
        assert!(submit_contact(&store, form("", "hi"), Utc::now()).is_err());
        let mut bad = form("Ravi", "hi");
        bad.email = "not-an-email".to_string();
        assert!(matches!(
            submit_contact(&store, bad, Utc::now()),
            Err(Error::Validation(_))
        ));
        let mut unagreed = form("Ravi", "hi");
        unagreed.terms_accepted = false;
        let err = submit_contact(&store, unagreed, Utc::now()).expect_err("terms required");
        assert_eq!(
            err.to_string(),
            "Please agree to our privacy policy and terms of service."
        );
        assert!(store.contact_messages().expect("read").is_empty());
    }

    #[test]
    fn transaction_monitor_spans_users() {
        let (_dir, store) = setup();
        let now = Utc::now();
        crate::bank::deposit(&store, "user-1", 0, 500.0, "", now).expect("deposit");
        crate::bank::deposit(&store, "user-1", 0, 9_000.0, "Salary", now).expect("deposit");
        let filter = MonitorFilter {
            kind: TypeFilter::Credit,
            q: Some("asha".to_string()),
            range: DateRange::Today,
            max_amount: Some(1_000.0),
            ..MonitorFilter::default()
        };
        let monitor = transactions(&store, &filter, now.date_naive()).expect("monitor");
        assert_eq!(monitor.transactions.len(), 1);
        assert_eq!(monitor.transactions[0].transaction.description, "Quick Add");
        assert_eq!(monitor.summary.credit_count, 1);
    }

    #[test]
    fn users_csv_has_header_and_one_row_per_user() {
        let (_dir, store) = setup();
        let mut other = sample_user(75.5);
        other.user_id = "user-2".to_string();
        other.full_name = "Vikram Shah, Jr".to_string();
        other.email = "vikram@example.com".to_string();
        other.status = UserStatus::Blocked;
        store.save_user(&other).expect("save");

        let bytes = users_csv(&store, &UserFilter::default()).expect("csv");
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let header = reader.headers().expect("header").clone();
        assert_eq!(header.iter().collect::<Vec<_>>(), USERS_CSV_HEADER.to_vec());

        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<std::result::Result<_, _>>().expect("rows");
        assert_eq!(rows.len(), 2);
        let vikram = rows.iter().find(|r| &r[0] == "user-2").expect("row");
        assert_eq!(&vikram[1], "Vikram Shah, Jr");
        assert_eq!(&vikram[5], "75.50");
        assert_eq!(&vikram[6], "Blocked");

        let blocked_only = users_csv(
            &store,
            &UserFilter {
                q: None,
                status: Some(UserStatus::Blocked),
            },
        )
        .expect("csv");
        let text = String::from_utf8(blocked_only).expect("utf8");
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"Vikram Shah, Jr\""));
    }
}

//! Money movement across users: transfers, deposits and loan applications.
//!
//! Each step is a single-user atomic transaction on the store. A transfer is
//! a debit on the sender followed by a credit on the recipient; if the credit
//! leg fails the debit is undone with a compensating credit.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::{
    EmiRequest, Loan, LoanStatus, TermUnit, Transaction, TransactionKind, apply_transaction,
    add_loan, breakdown, validate,
};
use crate::error::{Error, Result};
use crate::store::JsonStore;

/// Amounts offered as one-click deposits.
pub const QUICK_ADD_AMOUNTS: [f64; 3] = [1_000.0, 5_000.0, 10_000.0];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub from_account: usize,
    pub to_account_number: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub loan_type: String,
    pub amount: f64,
    pub interest_rate: f64,
    pub term: f64,
    #[serde(default)]
    pub term_unit: TermUnit,
}

pub fn transfer_funds(
    store: &JsonStore,
    user_id: &str,
    request: &TransferRequest,
    now: DateTime<Utc>,
) -> Result<Transaction> {
    validate::amount(request.amount)?;
    let to = request.to_account_number.trim();
    if to.is_empty() {
        return Err(Error::validation("Recipient account number is required"));
    }

    let sender = store.load_user(user_id)?.ok_or(Error::UserNotFound)?;
    let from = sender
        .accounts
        .get(request.from_account)
        .ok_or(Error::AccountNotFound)?
        .account_number
        .clone();
    if from == to {
        return Err(Error::validation("Cannot transfer to the same account"));
    }

    let description = request.description.trim();
    let debit = store.atomic_transaction(user_id, |user| {
        apply_transaction(
            user,
            request.from_account,
            TransactionKind::Debit,
            request.amount,
            &format!("Transfer to {to}: {description}"),
            None,
            now,
        )
    })?;

    let recipient = match store.find_by_account_number(to) {
        Ok(Some(found)) => Ok(found),
        Ok(None) => {
            reverse(store, user_id, request, to, "Recipient not found", now)?;
            warn!(user_id, to, "transfer reversed: recipient not found");
            return Err(Error::RecipientNotFound);
        }
        Err(e) => Err(e),
    };

    let credit = recipient.and_then(|(recipient, index)| {
        store.atomic_transaction(&recipient.user_id, |user| {
            apply_transaction(
                user,
                index,
                TransactionKind::Credit,
                request.amount,
                &format!("Transfer from {from}: {description}"),
                Some(debit.transaction_id.clone()),
                now,
            )
        })
    });
    if let Err(e) = credit {
        let reason = e.to_string();
        reverse(store, user_id, request, to, &reason, now)?;
        warn!(user_id, to, error = %reason, "transfer reversed: credit failed");
        return Err(Error::TransferReversed(reason));
    }

    store.log_activity(
        user_id,
        "transfer",
        json!({ "from": from, "to": to, "amount": request.amount }),
        now,
    );
    info!(user_id, from = %from, to, amount = request.amount, "transfer completed");
    Ok(debit)
}

/// Compensating credit for a debit whose recipient leg failed.
fn reverse(
    store: &JsonStore,
    user_id: &str,
    request: &TransferRequest,
    to: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    store.atomic_transaction(user_id, |user| {
        apply_transaction(
            user,
            request.from_account,
            TransactionKind::Credit,
            request.amount,
            &format!("Reversal of failed transfer to {to}: {reason}"),
            None,
            now,
        )
    })?;
    Ok(())
}

pub fn deposit(
    store: &JsonStore,
    user_id: &str,
    account_index: usize,
    amount: f64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<Transaction> {
    let description = match description.trim() {
        "" => "Quick Add",
        other => other,
    };
    let tx = store.atomic_transaction(user_id, |user| {
        apply_transaction(
            user,
            account_index,
            TransactionKind::Credit,
            amount,
            description,
            None,
            now,
        )
    })?;
    store.log_activity(user_id, "deposit", json!({ "amount": amount }), now);
    Ok(tx)
}

/// Records a pending loan with its EMI worked out from the requested terms.
pub fn apply_for_loan(
    store: &JsonStore,
    user_id: &str,
    application: &LoanApplication,
    now: DateTime<Utc>,
) -> Result<Loan> {
    let loan_type = application.loan_type.trim();
    if loan_type.is_empty() {
        return Err(Error::validation("Loan type is required"));
    }
    let terms = EmiRequest {
        principal: application.amount,
        annual_rate: application.interest_rate,
        term: application.term,
        unit: application.term_unit,
    };
    terms.validate()?;
    let emi = breakdown(terms.principal, terms.annual_rate, terms.years()).emi;

    let loan = Loan {
        loan_id: String::new(),
        loan_type: loan_type.to_string(),
        amount: terms.principal,
        interest_rate: terms.annual_rate,
        term_months: terms.months(),
        emi,
        status: LoanStatus::Pending,
        timestamp: None,
        updated_at: None,
    };
    let loan = store.atomic_transaction(user_id, |user| add_loan(user, loan, now))?;
    store.log_activity(
        user_id,
        "loan_application",
        json!({ "loan_id": loan.loan_id, "amount": loan.amount }),
        now,
    );
    Ok(loan)
}

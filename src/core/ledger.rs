use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{Loan, LoanStatus, Transaction, TransactionKind, User};
use super::validate;
use crate::error::{Error, Result};

/// Posts a credit or debit to one of the user's accounts.
///
/// Debits never take a balance below zero. The appended record carries the
/// balance after posting.
pub fn apply_transaction(
    user: &mut User,
    account_index: usize,
    kind: TransactionKind,
    amount: f64,
    description: &str,
    reference: Option<String>,
    now: DateTime<Utc>,
) -> Result<Transaction> {
    validate::amount(amount)?;
    let account = user
        .accounts
        .get_mut(account_index)
        .ok_or(Error::AccountNotFound)?;

    if kind == TransactionKind::Debit && account.balance < amount {
        return Err(Error::InsufficientBalance);
    }

    match kind {
        TransactionKind::Credit => account.balance += amount,
        TransactionKind::Debit => account.balance -= amount,
    }

    let transaction = Transaction {
        transaction_id: Uuid::new_v4().to_string(),
        kind,
        amount,
        description: description.to_string(),
        timestamp: now,
        balance_after: account.balance,
        reference,
    };
    account.transactions.push(transaction.clone());
    Ok(transaction)
}

/// Records a loan, disbursing it into the primary account if it arrives approved.
pub fn add_loan(user: &mut User, mut loan: Loan, now: DateTime<Utc>) -> Result<Loan> {
    if loan.loan_id.is_empty() {
        loan.loan_id = Uuid::new_v4().to_string();
    }
    if loan.timestamp.is_none() {
        loan.timestamp = Some(now);
    }
    if loan.status == LoanStatus::Approved {
        disburse(user, &loan, now)?;
    }
    user.loans.push(loan.clone());
    Ok(loan)
}

/// Moves a loan to `status`. Only a transition into `Approved` disburses.
pub fn update_loan_status(
    user: &mut User,
    loan_id: &str,
    status: LoanStatus,
    now: DateTime<Utc>,
) -> Result<Loan> {
    let index = user
        .loans
        .iter()
        .position(|loan| loan.loan_id == loan_id)
        .ok_or(Error::LoanNotFound)?;

    let previous = user.loans[index].status;
    if status == LoanStatus::Approved && previous != LoanStatus::Approved {
        let loan = user.loans[index].clone();
        disburse(user, &loan, now)?;
    }

    let loan = &mut user.loans[index];
    loan.status = status;
    loan.updated_at = Some(now);
    Ok(loan.clone())
}

fn disburse(user: &mut User, loan: &Loan, now: DateTime<Utc>) -> Result<()> {
    if user.accounts.is_empty() {
        return Ok(());
    }
    apply_transaction(
        user,
        0,
        TransactionKind::Credit,
        loan.amount,
        &format!("Loan disbursement - {}", loan.loan_type),
        Some(loan.loan_id.clone()),
        now,
    )?;
    Ok(())
}

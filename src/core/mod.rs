pub mod emi;
pub mod ledger;
pub mod stats;
mod types;
pub mod validate;

pub use emi::{
    Comparison, EmiBreakdown, EmiComparison, EmiRequest, SchedulePoint, TermUnit, breakdown,
    calculate_emi, compare, remaining_principal_schedule,
};
pub use ledger::{add_loan, apply_transaction, update_loan_status};
pub use types::{
    Account, AccountType, ActivityEntry, ContactMessage, ContactMessages, Loan, LoanStatus,
    NotificationPreferences, Preferences, PublicUser, Role, Security, Theme, Transaction,
    TransactionKind, User, UserStatus,
};

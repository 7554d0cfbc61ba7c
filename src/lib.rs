//! Shared-expense ledger: computes what every member of a group owes or is
//! owed, and the transfers that settle the group.
pub mod balance;
pub mod config;
pub mod error;
pub mod events;
pub mod routes;
pub mod schemas;
pub mod settlement;
pub mod store;

pub use balance::{compute_member_balances, MemberBalance, UntrackedPolicy};
pub use error::{AppError, LedgerError};
pub use schemas::{Expense, Group, Member, MemberId};
pub use settlement::{compute_report, reduce, BalanceReport, Settlement};

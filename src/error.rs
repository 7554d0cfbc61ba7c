use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while turning a group's expenses into balances.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The expense cannot be split: no participants, or an amount that is not
    /// a positive finite number.
    #[error("invalid expense {expense_id}: {reason}")]
    InvalidExpense { expense_id: String, reason: String },

    /// The expense names a payer or participant who is not a member of the
    /// group. Only raised under [`UntrackedPolicy::Reject`](crate::UntrackedPolicy::Reject).
    #[error("expense {expense_id} references {member_id}, who is not a member of the group")]
    UntrackedReference {
        expense_id: String,
        member_id: String,
    },
}

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("couldn't find the group {0}")]
    GroupNotFound(String),

    #[error("the group {0} already exists")]
    GroupExists(String),

    #[error("couldn't find the expense {0}")]
    ExpenseNotFound(String),

    #[error("{0}")]
    InvalidExpense(LedgerError),

    /// A new expense names someone outside the group while such expenses
    /// are rejected.
    #[error("{0}")]
    UntrackedMember(LedgerError),

    #[error("invalid member: {0}")]
    InvalidMember(String),

    /// The balances could not be computed from the stored expenses. The inner
    /// error is only logged, clients get a generic message.
    #[error("could not compute balances")]
    BalanceComputation(LedgerError),

    #[error("storage failure")]
    Store(#[from] StoreError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::GroupNotFound(_) | AppError::ExpenseNotFound(_) => StatusCode::NOT_FOUND,
            AppError::GroupExists(_) => StatusCode::CONFLICT,
            AppError::InvalidExpense(_)
            | AppError::UntrackedMember(_)
            | AppError::InvalidMember(_) => StatusCode::BAD_REQUEST,
            AppError::BalanceComputation(_) | AppError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::BalanceComputation(err) => {
                tracing::error!("could not compute balances: {err}")
            }
            AppError::Store(err) => tracing::error!("storage failure: {err}"),
            _ => tracing::debug!("rejected request: {self}"),
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

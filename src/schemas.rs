use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub type MemberId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

impl Group {
    pub fn new(id: String, name: String, description: String) -> Self {
        Group {
            id,
            name,
            description,
            members: vec![],
            expenses: vec![],
        }
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.members.iter().any(|member| member.id == id)
    }

    /// First party of `expense`, payer included, who hasn't joined the group.
    pub fn untracked_party<'a>(&self, expense: &'a Expense) -> Option<&'a MemberId> {
        std::iter::once(&expense.paid_by)
            .chain(expense.unique_participants())
            .find(|id| !self.is_member(id))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
    pub paid_by: MemberId,
    pub participants: Vec<MemberId>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Checks the expense can be split: a positive, finite amount and at
    /// least one participant.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.participants.is_empty() {
            return Err(LedgerError::InvalidExpense {
                expense_id: self.id.clone(),
                reason: "an expense needs at least one participant".to_string(),
            });
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(LedgerError::InvalidExpense {
                expense_id: self.id.clone(),
                reason: format!("the amount must be positive, got {}", self.amount),
            });
        }
        Ok(())
    }

    /// Participants with duplicates removed, keeping the first occurrence.
    pub fn unique_participants(&self) -> Vec<&MemberId> {
        let mut unique: Vec<&MemberId> = Vec::with_capacity(self.participants.len());
        for participant in &self.participants {
            if !unique.contains(&participant) {
                unique.push(participant);
            }
        }
        unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(amount: f64, participants: &[&str]) -> Expense {
        Expense {
            id: "e1".to_string(),
            description: "dinner".to_string(),
            amount,
            paid_by: "alice".to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_participants_are_rejected() {
        let err = expense(10.0, &[]).validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidExpense { expense_id, .. } if expense_id == "e1"));
    }

    #[test]
    fn non_positive_and_non_finite_amounts_are_rejected() {
        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(expense(amount, &["alice"]).validate().is_err(), "{amount}");
        }
    }

    #[test]
    fn the_payer_is_checked_before_the_participants() {
        let mut group = Group::new("trip".to_string(), "Trip".to_string(), String::new());
        group.members.push(Member {
            id: "bob".to_string(),
            name: "Bob".to_string(),
        });

        let expense = expense(10.0, &["bob", "zoe"]);
        assert_eq!(group.untracked_party(&expense).map(String::as_str), Some("alice"));

        group.members.push(Member {
            id: "alice".to_string(),
            name: "Alice".to_string(),
        });
        assert_eq!(group.untracked_party(&expense).map(String::as_str), Some("zoe"));

        group.members.push(Member {
            id: "zoe".to_string(),
            name: "Zoe".to_string(),
        });
        assert_eq!(group.untracked_party(&expense), None);
    }

    #[test]
    fn duplicate_participants_collapse_in_order() {
        let expense = expense(30.0, &["bob", "alice", "bob", "carol", "alice"]);
        assert_eq!(expense.unique_participants(), vec!["bob", "alice", "carol"]);
    }

    #[test]
    fn expense_uses_camel_case_fields() {
        let json = serde_json::to_value(expense(12.5, &["alice"])).unwrap();
        assert_eq!(json["paidBy"], "alice");
        assert_eq!(json["amount"], 12.5);
        assert!(json.get("createdAt").is_some());
    }
}

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::schemas::{Expense, Member, MemberId};

/// Net position of one member across the whole ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBalance {
    pub user_id: MemberId,
    pub name: String,
    pub balance: f64,
    pub total_paid: f64,
    pub total_share: f64,
}

impl MemberBalance {
    fn zero(user_id: MemberId, name: String) -> Self {
        MemberBalance {
            user_id,
            name,
            balance: 0.0,
            total_paid: 0.0,
            total_share: 0.0,
        }
    }
}

/// What to do when an expense names someone who isn't in the member list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntrackedPolicy {
    /// Skip the contribution of the unknown party.
    #[default]
    Drop,
    /// Fail with [`LedgerError::UntrackedReference`].
    Reject,
    /// Give the unknown party its own ledger line, named after its id.
    Include,
}

impl FromStr for UntrackedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(UntrackedPolicy::Drop),
            "reject" => Ok(UntrackedPolicy::Reject),
            "include" => Ok(UntrackedPolicy::Include),
            other => Err(format!(
                "unknown policy {other:?}, expected drop, reject or include"
            )),
        }
    }
}

struct Ledger {
    lines: Vec<MemberBalance>,
    index: HashMap<MemberId, usize>,
    policy: UntrackedPolicy,
}

impl Ledger {
    fn new(members: &[Member], policy: UntrackedPolicy) -> Self {
        let mut ledger = Ledger {
            lines: Vec::with_capacity(members.len()),
            index: HashMap::with_capacity(members.len()),
            policy,
        };
        for member in members {
            if ledger.index.contains_key(&member.id) {
                continue;
            }
            ledger.index.insert(member.id.clone(), ledger.lines.len());
            ledger
                .lines
                .push(MemberBalance::zero(member.id.clone(), member.name.clone()));
        }
        ledger
    }

    /// Finds the ledger line of `id`, or `None` when the contribution should be dropped.
    fn line(
        &mut self,
        id: &MemberId,
        expense: &Expense,
    ) -> Result<Option<&mut MemberBalance>, LedgerError> {
        let position = match (self.index.get(id).copied(), self.policy) {
            (Some(position), _) => position,
            (None, UntrackedPolicy::Drop) => {
                tracing::debug!(
                    expense = %expense.id,
                    member = %id,
                    "dropping contribution of a party outside the group"
                );
                return Ok(None);
            }
            (None, UntrackedPolicy::Reject) => {
                return Err(LedgerError::UntrackedReference {
                    expense_id: expense.id.clone(),
                    member_id: id.clone(),
                })
            }
            (None, UntrackedPolicy::Include) => {
                self.index.insert(id.clone(), self.lines.len());
                self.lines.push(MemberBalance::zero(id.clone(), id.clone()));
                self.lines.len() - 1
            }
        };
        Ok(self.lines.get_mut(position))
    }
}

/// Computes what every member paid, what their share of the expenses is, and
/// the difference between both.
///
/// Balances come back in member order. Unknown parties are handled following
/// `policy`; with [`UntrackedPolicy::Include`] their lines are appended after
/// the members in the order they are first seen.
pub fn compute_member_balances(
    members: &[Member],
    expenses: &[Expense],
    policy: UntrackedPolicy,
) -> Result<Vec<MemberBalance>, LedgerError> {
    for expense in expenses {
        expense.validate()?;
    }

    let mut ledger = Ledger::new(members, policy);
    for expense in expenses {
        let participants = expense.unique_participants();
        let share_per_person = expense.amount / participants.len() as f64;

        if let Some(payer) = ledger.line(&expense.paid_by, expense)? {
            payer.total_paid += expense.amount;
        }
        for participant in participants {
            if let Some(line) = ledger.line(participant, expense)? {
                line.total_share += share_per_person;
            }
        }
    }

    let mut balances = ledger.lines;
    for line in balances.iter_mut() {
        line.balance = line.total_paid - line.total_share;
    }
    Ok(balances)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_uppercase(),
        }
    }

    fn expense(id: &str, amount: f64, paid_by: &str, participants: &[&str]) -> Expense {
        Expense {
            id: id.to_string(),
            description: String::new(),
            amount,
            paid_by: paid_by.to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    fn find<'a>(balances: &'a [MemberBalance], id: &str) -> &'a MemberBalance {
        balances.iter().find(|b| b.user_id == id).unwrap()
    }

    #[test]
    fn one_payer_split_three_ways() {
        let members = [member("alice"), member("bob"), member("carol")];
        let expenses = [expense("e1", 90.0, "alice", &["alice", "bob", "carol"])];

        let balances = compute_member_balances(&members, &expenses, UntrackedPolicy::Drop).unwrap();

        let alice = find(&balances, "alice");
        assert_eq!(alice.total_paid, 90.0);
        assert_eq!(alice.total_share, 30.0);
        assert_eq!(alice.balance, 60.0);
        assert_eq!(find(&balances, "bob").balance, -30.0);
        assert_eq!(find(&balances, "carol").balance, -30.0);
    }

    #[test]
    fn balances_follow_member_order() {
        let members = [member("carol"), member("alice"), member("bob")];
        let balances = compute_member_balances(&members, &[], UntrackedPolicy::Drop).unwrap();
        let ids: Vec<_> = balances.iter().map(|b| b.user_id.as_str()).collect();
        assert_eq!(ids, ["carol", "alice", "bob"]);
        assert!(balances.iter().all(|b| b.balance == 0.0
            && b.total_paid == 0.0
            && b.total_share == 0.0));
    }

    #[test]
    fn paying_only_for_yourself_changes_nothing() {
        let members = [member("alice"), member("bob")];
        let expenses = [expense("e1", 42.5, "alice", &["alice"])];

        let balances = compute_member_balances(&members, &expenses, UntrackedPolicy::Drop).unwrap();

        let alice = find(&balances, "alice");
        assert_eq!(alice.total_paid, 42.5);
        assert_eq!(alice.total_share, 42.5);
        assert_eq!(alice.balance, 0.0);
    }

    #[test]
    fn duplicated_participants_count_once() {
        let members = [member("alice"), member("bob")];
        let expenses = [expense("e1", 20.0, "alice", &["alice", "bob", "bob"])];

        let balances = compute_member_balances(&members, &expenses, UntrackedPolicy::Drop).unwrap();

        assert_eq!(find(&balances, "bob").total_share, 10.0);
        assert_eq!(find(&balances, "alice").balance, 10.0);
    }

    #[test]
    fn an_invalid_expense_fails_the_whole_call() {
        let members = [member("alice"), member("bob")];
        let expenses = [
            expense("e1", 20.0, "alice", &["alice", "bob"]),
            expense("e2", 10.0, "bob", &[]),
        ];

        let err = compute_member_balances(&members, &expenses, UntrackedPolicy::Drop).unwrap_err();

        assert!(matches!(err, LedgerError::InvalidExpense { ref expense_id, .. } if expense_id == "e2"));
    }

    #[test]
    fn untracked_parties_are_dropped_by_default() {
        let members = [member("alice"), member("bob")];
        let expenses = [
            expense("e1", 30.0, "alice", &["alice", "bob", "dave"]),
            expense("e2", 12.0, "dave", &["bob"]),
        ];

        let balances = compute_member_balances(&members, &expenses, UntrackedPolicy::Drop).unwrap();

        assert_eq!(balances.len(), 2);
        assert_eq!(find(&balances, "alice").balance, 20.0);
        assert_eq!(find(&balances, "bob").total_share, 22.0);
    }

    #[test]
    fn untracked_parties_can_be_rejected() {
        let members = [member("alice")];
        let expenses = [expense("e1", 30.0, "alice", &["alice", "dave"])];

        let err = compute_member_balances(&members, &expenses, UntrackedPolicy::Reject).unwrap_err();

        assert_eq!(
            err,
            LedgerError::UntrackedReference {
                expense_id: "e1".to_string(),
                member_id: "dave".to_string(),
            }
        );
    }

    #[test]
    fn untracked_parties_can_be_included() {
        let members = [member("alice")];
        let expenses = [
            expense("e1", 30.0, "alice", &["alice", "dave"]),
            expense("e2", 8.0, "erin", &["alice"]),
        ];

        let balances =
            compute_member_balances(&members, &expenses, UntrackedPolicy::Include).unwrap();

        let ids: Vec<_> = balances.iter().map(|b| b.user_id.as_str()).collect();
        assert_eq!(ids, ["alice", "dave", "erin"]);
        assert_eq!(find(&balances, "dave").name, "dave");
        assert_eq!(find(&balances, "dave").balance, -15.0);
        assert_eq!(find(&balances, "erin").balance, 8.0);
        assert_eq!(find(&balances, "alice").balance, 7.0);
        let total: f64 = balances.iter().map(|b| b.balance).sum();
        assert!(total.abs() < 1e-9);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Drop".parse::<UntrackedPolicy>(), Ok(UntrackedPolicy::Drop));
        assert_eq!(" reject ".parse::<UntrackedPolicy>(), Ok(UntrackedPolicy::Reject));
        assert_eq!("INCLUDE".parse::<UntrackedPolicy>(), Ok(UntrackedPolicy::Include));
        assert!("ignore".parse::<UntrackedPolicy>().is_err());
    }
}

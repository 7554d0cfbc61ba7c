use serde::{Deserialize, Serialize};

use crate::balance::{compute_member_balances, MemberBalance, UntrackedPolicy};
use crate::error::LedgerError;
use crate::schemas::{Expense, Group, Member, MemberId};

/// Balances closer to zero than this are considered settled.
pub const SETTLED_THRESHOLD: f64 = 0.01;

/// A proposed transfer: `from` pays `to` the given amount.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub from: MemberId,
    pub from_name: String,
    pub to: MemberId,
    pub to_name: String,
    pub amount: f64,
}

/// Everything the balances endpoint reports for a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub balances: Vec<MemberBalance>,
    pub settlements: Vec<Settlement>,
}

impl BalanceReport {
    /// True when nobody owes anything.
    pub fn is_settled(&self) -> bool {
        self.settlements.is_empty()
    }
}

#[derive(Clone, Debug)]
struct PersonalBalance<'a> {
    id: &'a MemberId,
    name: &'a str,
    balance: f64,
}

pub fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Proposes the transfers that bring every balance back to zero.
///
/// The biggest debtor always pays the biggest creditor as much as possible,
/// then whoever got settled leaves the table. Members with equal balances keep
/// their input order, so the plan is deterministic.
///
/// Amounts are rounded to cents only when emitted, so paying the plan can
/// leave a member up to half a cent per settlement away from zero, on top of
/// the one cent threshold.
pub fn reduce(balances: &[MemberBalance]) -> Vec<Settlement> {
    let total: f64 = balances.iter().map(|b| b.balance).sum();
    if total.abs() > SETTLED_THRESHOLD {
        tracing::warn!(total, "balances don't add up to zero, the plan won't settle the group");
    }

    let mut creditors = Vec::new();
    let mut debtors = Vec::new();
    for member in balances {
        let person = PersonalBalance {
            id: &member.user_id,
            name: &member.name,
            balance: member.balance,
        };
        if member.balance > SETTLED_THRESHOLD {
            creditors.push(person);
        } else if member.balance < -SETTLED_THRESHOLD {
            debtors.push(person);
        }
    }

    // Vec::sort_by is stable, ties stay in input order
    creditors.sort_by(|a, b| b.balance.total_cmp(&a.balance));
    debtors.sort_by(|a, b| a.balance.total_cmp(&b.balance));

    let mut settlements = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < creditors.len() && j < debtors.len() {
        let creditor = &mut creditors[i];
        let debtor = &mut debtors[j];

        let amount = creditor.balance.min(-debtor.balance);
        settlements.push(Settlement {
            from: debtor.id.clone(),
            from_name: debtor.name.to_string(),
            to: creditor.id.clone(),
            to_name: creditor.name.to_string(),
            amount: round_to_2_decimals(amount),
        });
        creditor.balance -= amount;
        debtor.balance += amount;

        if creditor.balance < SETTLED_THRESHOLD {
            i += 1;
        }
        if debtor.balance.abs() < SETTLED_THRESHOLD {
            j += 1;
        }
    }

    let leftover = creditors[i..]
        .iter()
        .chain(&debtors[j..])
        .filter(|person| person.balance.abs() >= SETTLED_THRESHOLD)
        .count();
    if leftover > 0 {
        tracing::warn!(leftover, "some balances are still open after settling");
    }

    settlements
}

/// Computes the balances of `members` and the transfers that settle them.
pub fn compute_report(
    members: &[Member],
    expenses: &[Expense],
    policy: UntrackedPolicy,
) -> Result<BalanceReport, LedgerError> {
    let balances = compute_member_balances(members, expenses, policy)?;
    let settlements = reduce(&balances);
    Ok(BalanceReport {
        balances,
        settlements,
    })
}

pub fn compute_report_for_group(
    group: &Group,
    policy: UntrackedPolicy,
) -> Result<BalanceReport, LedgerError> {
    compute_report(&group.members, &group.expenses, policy)
}

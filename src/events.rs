use serde::Serialize;
use tokio::sync::broadcast;

use crate::schemas::{Expense, Member};
use crate::settlement::BalanceReport;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum EventKind {
    ExpenseCreated(Expense),
    ExpenseDeleted {
        #[serde(rename = "expenseId")]
        expense_id: String,
    },
    MemberJoined(Member),
    BalancesUpdated(BalanceReport),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEvent {
    pub group_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Fans group changes out to whoever is listening.
#[derive(Clone, Debug)]
pub struct GroupEvents {
    sender: broadcast::Sender<GroupEvent>,
}

impl Default for GroupEvents {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl GroupEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        GroupEvents { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, group_id: &str, kind: EventKind) {
        let event = GroupEvent {
            group_id: group_id.to_string(),
            kind,
        };
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(group = group_id, receivers, "published event"),
            Err(_) => tracing::debug!(group = group_id, "no subscribers for event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_without_subscribers_is_fine() {
        GroupEvents::default().publish(
            "trip",
            EventKind::ExpenseDeleted {
                expense_id: "e1".to_string(),
            },
        );
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let events = GroupEvents::default();
        let mut receiver = events.subscribe();
        let member = Member {
            id: "alice".to_string(),
            name: "Alice".to_string(),
        };

        events.publish("trip", EventKind::MemberJoined(member.clone()));
        events.publish(
            "trip",
            EventKind::ExpenseDeleted {
                expense_id: "e1".to_string(),
            },
        );

        assert_eq!(
            receiver.try_recv().unwrap(),
            GroupEvent {
                group_id: "trip".to_string(),
                kind: EventKind::MemberJoined(member),
            }
        );
        assert!(matches!(
            receiver.try_recv().unwrap().kind,
            EventKind::ExpenseDeleted { .. }
        ));
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = GroupEvent {
            group_id: "trip".to_string(),
            kind: EventKind::ExpenseDeleted {
                expense_id: "e1".to_string(),
            },
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["groupId"], "trip");
        assert_eq!(json["type"], "expense-deleted");
        assert_eq!(json["payload"]["expenseId"], "e1");
        assert!(json["payload"].get("expense_id").is_none());
    }
}

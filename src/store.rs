//! Persistence of groups, their members and their expenses.
#![allow(async_fn_in_trait)]

use std::collections::HashMap;

use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateOptions},
    Collection, Database, IndexModel,
};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::schemas::{Expense, Group, Member};

pub const GROUPS_COLLECTION: &str = "Groups";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("couldn't serialize the document: {0}")]
    Serialization(#[from] bson::ser::Error),
}

/// Loads and updates groups. Expenses are stored inside their group.
pub trait GroupStore {
    /// Saves a new group. Returns `false` if a group with the same id exists.
    async fn create_group(&self, group: &Group) -> Result<bool, StoreError>;

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError>;

    /// Deletes a group with its members and expenses. Returns `false` if it
    /// doesn't exist.
    async fn delete_group(&self, id: &str) -> Result<bool, StoreError>;

    /// Adds `member` to the group unless someone with the same id already
    /// joined. Returns `false` if the group doesn't exist.
    async fn add_member(&self, group_id: &str, member: &Member) -> Result<bool, StoreError>;

    /// Appends an expense. Returns `false` if the group doesn't exist.
    async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<bool, StoreError>;

    /// Deletes an expense. Returns `false` if there was nothing to delete.
    async fn remove_expense(&self, group_id: &str, expense_id: &str)
        -> Result<bool, StoreError>;
}

#[derive(Clone, Debug)]
pub struct MongoStore {
    groups: Collection<Group>,
}

impl MongoStore {
    /// Opens the groups collection, making sure group ids are unique.
    pub async fn new(database: &Database) -> Result<Self, StoreError> {
        let groups = database.collection::<Group>(GROUPS_COLLECTION);
        let unique_id = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        groups.create_index(unique_id, None).await?;
        Ok(MongoStore { groups })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

impl GroupStore for MongoStore {
    async fn create_group(&self, group: &Group) -> Result<bool, StoreError> {
        let mut fields = bson::to_document(group)?;
        // Comes from the filter on insert
        fields.remove("id");
        let upsert = UpdateOptions::builder().upsert(true).build();
        let result = self
            .groups
            .update_one(
                doc! { "id": group.id.as_str() },
                doc! { "$setOnInsert": fields },
                upsert,
            )
            .await;
        match result {
            Ok(result) => Ok(result.upserted_id.is_some()),
            // Lost a race against another insert of the same id
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.find_one(doc! { "id": id }, None).await?)
    }

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        let result = self.groups.delete_one(doc! { "id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn add_member(&self, group_id: &str, member: &Member) -> Result<bool, StoreError> {
        let pushed = bson::to_bson(member)?;
        let result = self
            .groups
            .update_one(
                doc! { "id": group_id, "members.id": { "$ne": member.id.as_str() } },
                doc! { "$push": { "members": pushed } },
                None,
            )
            .await?;
        if result.matched_count > 0 {
            return Ok(true);
        }
        // Either the group is missing or the member already joined
        Ok(self.find_group(group_id).await?.is_some())
    }

    async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<bool, StoreError> {
        let pushed = bson::to_bson(expense)?;
        let result = self
            .groups
            .update_one(
                doc! { "id": group_id },
                doc! { "$push": { "expenses": pushed } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn remove_expense(
        &self,
        group_id: &str,
        expense_id: &str,
    ) -> Result<bool, StoreError> {
        let result = self
            .groups
            .update_one(
                doc! { "id": group_id },
                doc! { "$pull": { "expenses": { "id": expense_id } } },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}

/// Keeps every group in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<String, Group>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(groups: impl IntoIterator<Item = Group>) -> Self {
        MemoryStore {
            groups: RwLock::new(
                groups
                    .into_iter()
                    .map(|group| (group.id.clone(), group))
                    .collect(),
            ),
        }
    }
}

impl GroupStore for MemoryStore {
    async fn create_group(&self, group: &Group) -> Result<bool, StoreError> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Ok(false);
        }
        groups.insert(group.id.clone(), group.clone());
        Ok(true)
    }

    async fn find_group(&self, id: &str) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.read().await.get(id).cloned())
    }

    async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.groups.write().await.remove(id).is_some())
    }

    async fn add_member(&self, group_id: &str, member: &Member) -> Result<bool, StoreError> {
        let mut groups = self.groups.write().await;
        let Some(group) = groups.get_mut(group_id) else {
            return Ok(false);
        };
        if !group.is_member(&member.id) {
            group.members.push(member.clone());
        }
        Ok(true)
    }

    async fn push_expense(&self, group_id: &str, expense: &Expense) -> Result<bool, StoreError> {
        let mut groups = self.groups.write().await;
        let Some(group) = groups.get_mut(group_id) else {
            return Ok(false);
        };
        group.expenses.push(expense.clone());
        Ok(true)
    }

    async fn remove_expense(
        &self,
        group_id: &str,
        expense_id: &str,
    ) -> Result<bool, StoreError> {
        let mut groups = self.groups.write().await;
        let Some(group) = groups.get_mut(group_id) else {
            return Ok(false);
        };
        let before = group.expenses.len();
        group.expenses.retain(|expense| expense.id != expense_id);
        Ok(group.expenses.len() < before)
    }
}

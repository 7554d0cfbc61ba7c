use actix_web::{web, HttpResponse};
use bson::oid::ObjectId;
use chrono::Utc;
use serde::Deserialize;

use crate::balance::UntrackedPolicy;
use crate::error::{AppError, LedgerError};
use crate::events::{EventKind, GroupEvents};
use crate::schemas::{Expense, Group, Member, MemberId};
use crate::settlement::compute_report_for_group;
use crate::store::GroupStore;

/// Shared by every worker of the server.
pub struct AppState<S> {
    pub store: S,
    pub events: GroupEvents,
    pub policy: UntrackedPolicy,
}

impl<S: GroupStore> AppState<S> {
    pub fn new(store: S, events: GroupEvents, policy: UntrackedPolicy) -> Self {
        AppState {
            store,
            events,
            policy,
        }
    }

    async fn group(&self, id: &str) -> Result<Group, AppError> {
        self.store
            .find_group(id)
            .await?
            .ok_or_else(|| AppError::GroupNotFound(id.to_string()))
    }

    /// Recomputes the balances of `group` and pushes them to the subscribers.
    /// A failure here doesn't fail the request that changed the group.
    fn publish_balances(&self, group: &Group) {
        match compute_report_for_group(group, self.policy) {
            Ok(report) => self
                .events
                .publish(&group.id, EventKind::BalancesUpdated(report)),
            Err(err) => tracing::warn!(group = %group.id, "not publishing balances: {err}"),
        }
    }
}

#[derive(Deserialize)]
struct NewGroup {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewExpense {
    amount: f64,
    #[serde(default)]
    description: String,
    paid_by: MemberId,
    participants: Vec<MemberId>,
}

async fn add_group<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
    json: web::Json<NewGroup>,
) -> Result<HttpResponse, AppError> {
    let json = json.into_inner();
    let group = Group::new(id.into_inner(), json.name, json.description);
    if !state.store.create_group(&group).await? {
        return Err(AppError::GroupExists(group.id));
    }
    tracing::info!(group = %group.id, "group added");
    Ok(HttpResponse::Created().json(group))
}

async fn get_group<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.group(&id).await?))
}

async fn delete_group<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    if !state.store.delete_group(&id).await? {
        return Err(AppError::GroupNotFound(id));
    }
    tracing::info!(group = %id, "group deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Group deleted" })))
}

async fn add_member<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
    member: web::Json<Member>,
) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    let member = member.into_inner();
    if member.id.trim().is_empty() {
        return Err(AppError::InvalidMember("the id can't be empty".to_string()));
    }
    if !state.store.add_member(&id, &member).await? {
        return Err(AppError::GroupNotFound(id));
    }
    let group = state.group(&id).await?;
    state.events.publish(&id, EventKind::MemberJoined(member));
    state.publish_balances(&group);
    Ok(HttpResponse::Ok().json(group))
}

async fn get_expenses<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.group(&id).await?.expenses))
}

async fn add_expense<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
    json: web::Json<NewExpense>,
) -> Result<HttpResponse, AppError> {
    let json = json.into_inner();
    let expense = Expense {
        id: ObjectId::new().to_hex(),
        description: json.description,
        amount: json.amount,
        paid_by: json.paid_by,
        participants: json.participants,
        created_at: Utc::now(),
    };
    expense.validate().map_err(AppError::InvalidExpense)?;

    let mut group = state.group(&id).await?;
    if state.policy == UntrackedPolicy::Reject {
        if let Some(member_id) = group.untracked_party(&expense) {
            return Err(AppError::UntrackedMember(LedgerError::UntrackedReference {
                expense_id: expense.id.clone(),
                member_id: member_id.clone(),
            }));
        }
    }
    if !state.store.push_expense(&group.id, &expense).await? {
        return Err(AppError::GroupNotFound(group.id));
    }
    tracing::info!(group = %group.id, expense = %expense.id, "expense added");

    group.expenses.push(expense.clone());
    state
        .events
        .publish(&group.id, EventKind::ExpenseCreated(expense.clone()));
    state.publish_balances(&group);
    Ok(HttpResponse::Created().json(expense))
}

async fn delete_expense<S: GroupStore>(
    state: web::Data<AppState<S>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (group_id, expense_id) = path.into_inner();
    let mut group = state.group(&group_id).await?;
    if !state.store.remove_expense(&group_id, &expense_id).await? {
        return Err(AppError::ExpenseNotFound(expense_id));
    }
    tracing::info!(group = %group_id, expense = %expense_id, "expense deleted");

    group.expenses.retain(|expense| expense.id != expense_id);
    state.events.publish(
        &group_id,
        EventKind::ExpenseDeleted {
            expense_id: expense_id.clone(),
        },
    );
    state.publish_balances(&group);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Expense deleted" })))
}

async fn get_balances<S: GroupStore>(
    state: web::Data<AppState<S>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let group = state.group(&id).await?;
    let report =
        compute_report_for_group(&group, state.policy).map_err(AppError::BalanceComputation)?;
    Ok(HttpResponse::Ok().json(report))
}

/// Registers every route, backed by the store `S` held in [`AppState`].
pub fn configure<S: GroupStore + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/groups/{id}")
            .route(web::put().to(add_group::<S>))
            .route(web::get().to(get_group::<S>))
            .route(web::delete().to(delete_group::<S>)),
    )
    .service(web::resource("/groups/{id}/members").route(web::post().to(add_member::<S>)))
    .service(
        web::resource("/groups/{id}/expenses")
            .route(web::get().to(get_expenses::<S>))
            .route(web::post().to(add_expense::<S>)),
    )
    .service(
        web::resource("/groups/{id}/expenses/{expense_id}")
            .route(web::delete().to(delete_expense::<S>)),
    )
    .service(web::resource("/groups/{id}/balances").route(web::get().to(get_balances::<S>)));
}

//! In-memory `users` service answering all six verbs.
//!
//! Handlers read their query from `CallContext`, so filters sent by another
//! node through the envelope apply exactly as if they were local.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use remote_service::RemoteError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::context::CallContext;
use crate::error::NodeError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub active: bool,
    /// Id of the calling user, taken from the call context on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Value>,
}

/// Body of create and update.
#[derive(Debug, Deserialize)]
pub struct UserData {
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Body of patch; absent fields are left alone.
#[derive(Debug, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Default)]
pub struct Users {
    next_id: u64,
    items: BTreeMap<u64, User>,
}

pub type Db = Arc<RwLock<Users>>;

pub fn router() -> Router {
    let db: Db = Arc::new(RwLock::new(Users::default()));
    Router::new()
        .route(
            "/users",
            get(find_users)
                .post(create_user)
                .patch(patch_users)
                .delete(remove_users),
        )
        .route(
            "/users/{id}",
            get(get_user)
                .put(update_user)
                .patch(patch_user)
                .delete(remove_user),
        )
        .with_state(db)
}

async fn find_users(State(db): State<Db>, ctx: CallContext) -> Json<Vec<User>> {
    let users = db.read().await;
    Json(select(&users, &ctx).cloned().collect())
}

async fn get_user(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<User>, NodeError> {
    let users = db.read().await;
    users.items.get(&id).cloned().map(Json).ok_or_else(|| missing(id))
}

async fn create_user(
    State(db): State<Db>,
    ctx: CallContext,
    Json(input): Json<UserData>,
) -> Result<(StatusCode, Json<User>), NodeError> {
    validate(&input)?;
    let mut users = db.write().await;
    users.next_id += 1;
    let user = User {
        id: users.next_id,
        name: input.name,
        email: input.email,
        active: input.active,
        created_by: ctx.get("user").and_then(|u| u.get("id")).cloned(),
    };
    users.items.insert(user.id, user.clone());
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UserData>,
) -> Result<Json<User>, NodeError> {
    validate(&input)?;
    let mut users = db.write().await;
    let user = users.items.get_mut(&id).ok_or_else(|| missing(id))?;
    user.name = input.name;
    user.email = input.email;
    user.active = input.active;
    Ok(Json(user.clone()))
}

async fn patch_user(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UserPatch>,
) -> Result<Json<User>, NodeError> {
    let mut users = db.write().await;
    let user = users.items.get_mut(&id).ok_or_else(|| missing(id))?;
    apply_patch(user, &input);
    Ok(Json(user.clone()))
}

async fn patch_users(
    State(db): State<Db>,
    ctx: CallContext,
    Json(input): Json<UserPatch>,
) -> Json<Vec<User>> {
    let mut users = db.write().await;
    let ids: Vec<u64> = select(&users, &ctx).map(|u| u.id).collect();
    let mut patched = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = users.items.get_mut(&id) {
            apply_patch(user, &input);
            patched.push(user.clone());
        }
    }
    Json(patched)
}

async fn remove_user(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<User>, NodeError> {
    let mut users = db.write().await;
    users.items.remove(&id).map(Json).ok_or_else(|| missing(id))
}

async fn remove_users(State(db): State<Db>, ctx: CallContext) -> Json<Vec<User>> {
    let mut users = db.write().await;
    let ids: Vec<u64> = select(&users, &ctx).map(|u| u.id).collect();
    Json(ids.into_iter().filter_map(|id| users.items.remove(&id)).collect())
}

fn missing(id: u64) -> NodeError {
    RemoteError::NotFound {
        message: format!("No record found for id '{id}'"),
        data: Some(json!({ "id": id })),
    }
    .into()
}

fn validate(input: &UserData) -> Result<(), NodeError> {
    if input.name.trim().is_empty() {
        return Err(RemoteError::BadRequest {
            message: "name is required".to_string(),
            data: Some(json!({ "field": "name" })),
        }
        .into());
    }
    Ok(())
}

fn apply_patch(user: &mut User, input: &UserPatch) {
    if let Some(name) = &input.name {
        user.name = name.clone();
    }
    if let Some(email) = &input.email {
        user.email = Some(email.clone());
    }
    if let Some(active) = input.active {
        user.active = active;
    }
}

/// Users matching every non-`$` query field, capped by `$limit`.
fn select<'a>(users: &'a Users, ctx: &'a CallContext) -> impl Iterator<Item = &'a User> + 'a {
    let query = ctx.query_map();
    let limit = query
        .and_then(|q| q.get("$limit"))
        .and_then(as_number)
        .map(|n| n as usize)
        .unwrap_or(usize::MAX);

    users
        .items
        .values()
        .filter(move |user| {
            let Some(query) = query else { return true };
            let record = serde_json::to_value(user).unwrap_or(Value::Null);
            query
                .iter()
                .filter(|(key, _)| !key.starts_with('$'))
                .all(|(key, expected)| field_matches(record.get(key), expected))
        })
        .take(limit)
}

/// Query strings only carry text, so `"true"` matches `true` and `"3"`
/// matches `3`.
fn field_matches(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else { return false };
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(_), _) => false,
        (_, Value::String(text)) => actual.to_string() == *text,
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64, name: &str, active: bool) -> User {
        User {
            id,
            name: name.to_string(),
            email: None,
            active,
            created_by: None,
        }
    }

    fn users() -> Users {
        let mut users = Users::default();
        for u in [user(1, "Ada", true), user(2, "Grace", false), user(3, "Alan", true)] {
            users.items.insert(u.id, u);
        }
        users.next_id = 3;
        users
    }

    fn ctx(query: Value) -> CallContext {
        CallContext {
            query: Some(query),
            ..Default::default()
        }
    }

    #[test]
    fn select_filters_by_typed_and_textual_values() {
        let users = users();
        let names = |ctx: &CallContext| -> Vec<String> {
            select(&users, ctx).map(|u| u.name.clone()).collect()
        };
        assert_eq!(names(&ctx(json!({ "active": true }))), vec!["Ada", "Alan"]);
        assert_eq!(names(&ctx(json!({ "active": "false" }))), vec!["Grace"]);
        assert_eq!(names(&ctx(json!({ "id": "3" }))), vec!["Alan"]);
        assert_eq!(names(&ctx(json!({ "$limit": 2 }))), vec!["Ada", "Grace"]);
        assert_eq!(names(&CallContext::default()).len(), 3);
    }

    #[test]
    fn unknown_fields_match_nothing() {
        let users = users();
        assert_eq!(select(&users, &ctx(json!({ "team": "x" }))).count(), 0);
    }

    #[test]
    fn patch_leaves_absent_fields() {
        let mut u = user(1, "Ada", true);
        apply_patch(
            &mut u,
            &UserPatch {
                name: None,
                email: Some("ada@example.com".into()),
                active: None,
            },
        );
        assert_eq!(u.name, "Ada");
        assert_eq!(u.email.as_deref(), Some("ada@example.com"));
        assert!(u.active);
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = validate(&UserData {
            name: "  ".into(),
            email: None,
            active: false,
        })
        .unwrap_err();
        assert_eq!(err.0.status(), 400);
    }

    #[test]
    fn user_serializes_camel_case() {
        let mut u = user(1, "Ada", true);
        u.created_by = Some(json!(9));
        let json = serde_json::to_value(&u).unwrap();
        assert_eq!(json["createdBy"], 9);
        assert!(json.get("email").is_none());
    }
}

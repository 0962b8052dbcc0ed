//! Per-request actor classification.
//!
//! Authentication is out of scope here; identity arrives on trusted headers
//! (`x-actor-id`, `x-actor-role`) set by the fronting layer. The actor is
//! derived per request and never persisted.

use crate::errors::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::Value;
use uuid::Uuid;

/// Coarse role carried by the `x-actor-role` header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Admin,
    Staff,
    User,
}

/// The requesting identity: admin, staff, regular user, or anonymous.
#[derive(Clone, Copy, Debug)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub role: Role,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            role: Role::User,
        }
    }

    /// Admins get the admin projection and bypass owner filtering.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Staff bypass owner filtering but do not get the admin projection.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }

    /// Ownership test: any configured ownership field of the object's JSON
    /// form equals this actor's id. Anonymous actors own nothing.
    pub fn owns(&self, object: &Value, ownership_fields: &[String]) -> bool {
        let Some(id) = self.id else {
            return false;
        };
        let id = id.to_string();
        ownership_fields.iter().any(|field| {
            object
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| v.eq_ignore_ascii_case(&id))
        })
    }
}

fn parse_role(raw: &str) -> Role {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Role::Admin,
        "staff" => Role::Staff,
        _ => Role::User,
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = match parts.headers.get("x-actor-id") {
            Some(value) => {
                let raw = value
                    .to_str()
                    .map_err(|_| ApiError::Validation("invalid x-actor-id header".into()))?;
                Some(Uuid::parse_str(raw).map_err(|_| {
                    ApiError::Validation(format!("x-actor-id `{raw}` is not a valid UUID"))
                })?)
            }
            None => None,
        };

        let role = parts
            .headers
            .get("x-actor-role")
            .and_then(|v| v.to_str().ok())
            .map(parse_role)
            .unwrap_or(Role::User);

        // A role header without an identity is meaningless; anonymous
        // requests are always plain users.
        if id.is_none() {
            return Ok(Actor::anonymous());
        }

        Ok(Actor { id, role })
    }
}

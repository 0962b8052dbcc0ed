//! HTTP handlers.

pub mod content_handlers;
pub mod file_handlers;
pub mod health_handlers;

use crate::models::actor::Actor;
use crate::views::fields::select_fields;
use crate::views::resolver::{Action, ViewRegistry};
use serde_json::Value;
use std::collections::BTreeSet;

/// Lenient boolean form values: `yes`, `true`, `t`, `1` (any case) are true.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "t" | "1"
    )
}

/// Shape one record for the response: resolve the projection for this actor
/// and action, apply it, then narrow further by the `?fields=` selection.
/// `check_ownership` enables the owner projection branch; list items pass
/// false.
pub fn render(
    registry: &ViewRegistry,
    actor: &Actor,
    action: Action,
    mut value: Value,
    check_ownership: bool,
    fields: Option<&BTreeSet<String>>,
) -> Value {
    let object = check_ownership.then_some(&value);
    let projection = registry.resolve(actor, action, object).clone();
    projection.apply(&mut value);
    if let Some(requested) = fields {
        select_fields(&mut value, requested);
    }
    value
}

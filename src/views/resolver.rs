//! Representation resolver.
//!
//! Selects which projection renders a response based on who is asking and
//! what they are doing. The lookup table is explicit and supplied at
//! configuration time; the default projection is a constructor argument so
//! a missing default is a setup error, never a runtime branch.

use crate::models::actor::Actor;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// The request's action, in viewset terms.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Action {
    List,
    Create,
    Retrieve,
    Update,
    Delete,
    Download,
}

/// A named subset of fields to emit from a record's JSON form.
#[derive(Clone, Debug)]
pub struct Projection {
    fields: BTreeSet<String>,
}

impl Projection {
    pub fn new<I>(fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Drop every object member not listed in this projection.
    /// Non-object values pass through untouched.
    pub fn apply(&self, value: &mut Value) {
        if let Value::Object(map) = value {
            map.retain(|key, _| self.fields.contains(key));
        }
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }
}

/// Projection lookup keyed by actor kind and action.
///
/// Resolution order, first match wins:
/// 1. the admin projection, for admin actors;
/// 2. the owner projection for the action, when the actor owns the object;
/// 3. the action projection;
/// 4. the default.
pub struct ViewRegistry {
    default: Projection,
    admin: Option<Projection>,
    owner: HashMap<Action, Projection>,
    per_action: HashMap<Action, Projection>,
    ownership_fields: Vec<String>,
}

impl ViewRegistry {
    pub fn new<I>(default: Projection, ownership_fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            default,
            admin: None,
            owner: HashMap::new(),
            per_action: HashMap::new(),
            ownership_fields: ownership_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admin(mut self, projection: Projection) -> Self {
        self.admin = Some(projection);
        self
    }

    pub fn owner(mut self, action: Action, projection: Projection) -> Self {
        self.owner.insert(action, projection);
        self
    }

    pub fn action(mut self, action: Action, projection: Projection) -> Self {
        self.per_action.insert(action, projection);
        self
    }

    pub fn ownership_fields(&self) -> &[String] {
        &self.ownership_fields
    }

    /// Resolve the projection for this actor and action. `object` is the
    /// record's JSON form for detail actions; list actions pass `None` and
    /// never hit the owner branch.
    pub fn resolve(&self, actor: &Actor, action: Action, object: Option<&Value>) -> &Projection {
        if actor.is_admin() {
            if let Some(projection) = &self.admin {
                return projection;
            }
        }

        if let Some(object) = object {
            if let Some(projection) = self.owner.get(&action) {
                if actor.owns(object, &self.ownership_fields) {
                    return projection;
                }
            }
        }

        if let Some(projection) = self.per_action.get(&action) {
            return projection;
        }

        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actor::Role;
    use serde_json::json;
    use uuid::Uuid;

    fn actor(role: Role) -> Actor {
        Actor {
            id: Some(Uuid::new_v4()),
            role,
        }
    }

    fn registry() -> ViewRegistry {
        ViewRegistry::new(Projection::new(["id", "name"]), ["owner_id"])
            .admin(Projection::new(["id", "name", "owner_id", "secret"]))
            .owner(Action::Retrieve, Projection::new(["id", "name", "owner_id"]))
            .action(Action::Create, Projection::new(["id", "name", "url"]))
    }

    #[test]
    fn admin_wins_regardless_of_action_or_ownership() {
        let registry = registry();
        let admin = actor(Role::Admin);
        let object = json!({ "owner_id": Uuid::new_v4() });

        for action in [Action::List, Action::Create, Action::Retrieve] {
            let projection = registry.resolve(&admin, action, Some(&object));
            assert!(projection.fields().contains("secret"));
        }
    }

    #[test]
    fn owner_projection_beats_default_for_owned_objects() {
        let registry = registry();
        let owner = actor(Role::User);
        let object = json!({ "owner_id": owner.id });

        let projection = registry.resolve(&owner, Action::Retrieve, Some(&object));
        assert!(projection.fields().contains("owner_id"));
        assert!(!projection.fields().contains("secret"));
    }

    #[test]
    fn non_owner_falls_through_to_default() {
        let registry = registry();
        let stranger = actor(Role::User);
        let object = json!({ "owner_id": Uuid::new_v4() });

        let projection = registry.resolve(&stranger, Action::Retrieve, Some(&object));
        assert_eq!(
            projection.fields().iter().collect::<Vec<_>>(),
            ["id", "name"]
        );
    }

    #[test]
    fn action_projection_applies_without_object() {
        let registry = registry();
        let projection = registry.resolve(&actor(Role::User), Action::Create, None);
        assert!(projection.fields().contains("url"));
    }

    #[test]
    fn staff_does_not_get_admin_projection() {
        let registry = registry();
        let projection = registry.resolve(&actor(Role::Staff), Action::List, None);
        assert!(!projection.fields().contains("secret"));
    }

    #[test]
    fn projection_apply_drops_unlisted_fields() {
        let projection = Projection::new(["id"]);
        let mut value = json!({ "id": 1, "name": "x" });
        projection.apply(&mut value);
        assert_eq!(value, json!({ "id": 1 }));
    }
}

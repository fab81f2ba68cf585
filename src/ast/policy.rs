/*
 * Copyright Cedar Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::ast::{Annotations, EntityType, EntityUID, Expr};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// The effect of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    /// this policy permits requests it applies to
    Permit,
    /// this policy forbids requests it applies to
    Forbid,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permit => write!(f, "permit"),
            Self::Forbid => write!(f, "forbid"),
        }
    }
}

/// Identifier for a policy within a `PolicySet`. Opaque string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyID(SmolStr);

impl PolicyID {
    /// Create a `PolicyID` from a string or string-like
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PolicyID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<SmolStr>> From<S> for PolicyID {
    fn from(s: S) -> Self {
        Self::new(s)
    }
}

/// A slot in a policy template, filled at link time with an `EntityUID`.
/// Slots may appear only in the principal and resource scope constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    /// The `?principal` slot
    Principal,
    /// The `?resource` slot
    Resource,
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Principal => write!(f, "?principal"),
            Self::Resource => write!(f, "?resource"),
        }
    }
}

/// Reference to an entity in a scope constraint: either a concrete UID, or
/// an open template slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityReference {
    /// Concrete entity UID
    EUID(Arc<EntityUID>),
    /// Open template slot
    Slot(SlotId),
}

impl EntityReference {
    /// Create an `EntityReference` to a concrete `EntityUID`
    pub fn euid(uid: EntityUID) -> Self {
        Self::EUID(Arc::new(uid))
    }

    fn link(&self, values: &HashMap<SlotId, EntityUID>) -> Self {
        match self {
            Self::EUID(_) => self.clone(),
            Self::Slot(id) => match values.get(id) {
                Some(euid) => Self::euid(euid.clone()),
                // unbound slots are rejected before substitution runs
                None => self.clone(),
            },
        }
    }

    fn slot(&self) -> Option<SlotId> {
        match self {
            Self::EUID(_) => None,
            Self::Slot(id) => Some(*id),
        }
    }
}

/// A scope constraint on the principal or resource of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrincipalOrResourceConstraint {
    /// Unconstrained
    Any,
    /// Equality constraint
    Eq(EntityReference),
    /// Hierarchy constraint
    In(EntityReference),
    /// Type constraint
    Is(EntityType),
    /// Type constraint combined with a hierarchy constraint
    IsIn(EntityType, EntityReference),
}

impl PrincipalOrResourceConstraint {
    fn link(&self, values: &HashMap<SlotId, EntityUID>) -> Self {
        match self {
            Self::Any | Self::Is(_) => self.clone(),
            Self::Eq(r) => Self::Eq(r.link(values)),
            Self::In(r) => Self::In(r.link(values)),
            Self::IsIn(ty, r) => Self::IsIn(ty.clone(), r.link(values)),
        }
    }

    fn slot(&self) -> Option<SlotId> {
        match self {
            Self::Any | Self::Is(_) => None,
            Self::Eq(r) | Self::In(r) | Self::IsIn(_, r) => r.slot(),
        }
    }
}

/// A scope constraint on the action of a request. Actions have no `is`
/// forms and no slots, but may be constrained to a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionConstraint {
    /// Unconstrained
    Any,
    /// Equality constraint
    Eq(Arc<EntityUID>),
    /// Hierarchy constraint against one or more action entities; matches if
    /// the action is in the hierarchy of any of them
    In(Vec<Arc<EntityUID>>),
}

/// Whether a condition clause must hold (`when`) or must not (`unless`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// The clause body must evaluate to `true` for the policy to apply
    When,
    /// The clause body must evaluate to `false` for the policy to apply
    Unless,
}

/// A single `when` or `unless` clause of a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionClause {
    kind: ConditionKind,
    body: Expr,
}

impl ConditionClause {
    /// Create a `when` clause
    pub fn when(body: Expr) -> Self {
        Self {
            kind: ConditionKind::When,
            body,
        }
    }

    /// Create an `unless` clause
    pub fn unless(body: Expr) -> Self {
        Self {
            kind: ConditionKind::Unless,
            body,
        }
    }

    /// Whether this is a `when` or an `unless` clause
    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// The boolean expression of this clause
    pub fn body(&self) -> &Expr {
        &self.body
    }
}

/// A policy: an effect, three scope constraints, a list of conditions, and
/// annotations. A policy whose scopes contain slots is a template and must
/// be linked before it can apply to a request.
///
/// Policies are immutable once constructed; the fluent constructors below
/// are the programmatic equivalent of the surface syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    effect: Effect,
    principal: PrincipalOrResourceConstraint,
    action: ActionConstraint,
    resource: PrincipalOrResourceConstraint,
    conditions: Vec<ConditionClause>,
    annotations: Arc<Annotations>,
}

impl Policy {
    /// Create a policy from all of its components
    pub fn new(
        effect: Effect,
        principal: PrincipalOrResourceConstraint,
        action: ActionConstraint,
        resource: PrincipalOrResourceConstraint,
        conditions: Vec<ConditionClause>,
        annotations: Annotations,
    ) -> Self {
        Self {
            effect,
            principal,
            action,
            resource,
            conditions,
            annotations: Arc::new(annotations),
        }
    }

    /// Create an unconstrained `permit` policy: `permit(principal, action, resource);`
    pub fn permit() -> Self {
        Self::unconstrained(Effect::Permit)
    }

    /// Create an unconstrained `forbid` policy: `forbid(principal, action, resource);`
    pub fn forbid() -> Self {
        Self::unconstrained(Effect::Forbid)
    }

    fn unconstrained(effect: Effect) -> Self {
        Self::new(
            effect,
            PrincipalOrResourceConstraint::Any,
            ActionConstraint::Any,
            PrincipalOrResourceConstraint::Any,
            vec![],
            Annotations::new(),
        )
    }

    /// Constrain the principal with `principal == uid`
    pub fn principal_eq(mut self, uid: EntityUID) -> Self {
        self.principal = PrincipalOrResourceConstraint::Eq(EntityReference::euid(uid));
        self
    }

    /// Constrain the principal with `principal in uid`
    pub fn principal_in(mut self, uid: EntityUID) -> Self {
        self.principal = PrincipalOrResourceConstraint::In(EntityReference::euid(uid));
        self
    }

    /// Constrain the principal with `principal is ty`
    pub fn principal_is(mut self, ty: impl Into<EntityType>) -> Self {
        self.principal = PrincipalOrResourceConstraint::Is(ty.into());
        self
    }

    /// Constrain the principal with `principal is ty in uid`
    pub fn principal_is_in(mut self, ty: impl Into<EntityType>, uid: EntityUID) -> Self {
        self.principal =
            PrincipalOrResourceConstraint::IsIn(ty.into(), EntityReference::euid(uid));
        self
    }

    /// Constrain the principal with `principal == ?principal` (template slot)
    pub fn principal_eq_slot(mut self) -> Self {
        self.principal =
            PrincipalOrResourceConstraint::Eq(EntityReference::Slot(SlotId::Principal));
        self
    }

    /// Constrain the principal with `principal in ?principal` (template slot)
    pub fn principal_in_slot(mut self) -> Self {
        self.principal =
            PrincipalOrResourceConstraint::In(EntityReference::Slot(SlotId::Principal));
        self
    }

    /// Constrain the action with `action == uid`
    pub fn action_eq(mut self, uid: EntityUID) -> Self {
        self.action = ActionConstraint::Eq(Arc::new(uid));
        self
    }

    /// Constrain the action with `action in uid`
    pub fn action_in(mut self, uid: EntityUID) -> Self {
        self.action = ActionConstraint::In(vec![Arc::new(uid)]);
        self
    }

    /// Constrain the action with `action in [uid, ...]`
    pub fn action_in_set(mut self, uids: impl IntoIterator<Item = EntityUID>) -> Self {
        self.action = ActionConstraint::In(uids.into_iter().map(Arc::new).collect());
        self
    }

    /// Constrain the resource with `resource == uid`
    pub fn resource_eq(mut self, uid: EntityUID) -> Self {
        self.resource = PrincipalOrResourceConstraint::Eq(EntityReference::euid(uid));
        self
    }

    /// Constrain the resource with `resource in uid`
    pub fn resource_in(mut self, uid: EntityUID) -> Self {
        self.resource = PrincipalOrResourceConstraint::In(EntityReference::euid(uid));
        self
    }

    /// Constrain the resource with `resource is ty`
    pub fn resource_is(mut self, ty: impl Into<EntityType>) -> Self {
        self.resource = PrincipalOrResourceConstraint::Is(ty.into());
        self
    }

    /// Constrain the resource with `resource is ty in uid`
    pub fn resource_is_in(mut self, ty: impl Into<EntityType>, uid: EntityUID) -> Self {
        self.resource = PrincipalOrResourceConstraint::IsIn(ty.into(), EntityReference::euid(uid));
        self
    }

    /// Constrain the resource with `resource == ?resource` (template slot)
    pub fn resource_eq_slot(mut self) -> Self {
        self.resource = PrincipalOrResourceConstraint::Eq(EntityReference::Slot(SlotId::Resource));
        self
    }

    /// Constrain the resource with `resource in ?resource` (template slot)
    pub fn resource_in_slot(mut self) -> Self {
        self.resource = PrincipalOrResourceConstraint::In(EntityReference::Slot(SlotId::Resource));
        self
    }

    /// Add a `when` clause
    pub fn when(mut self, body: Expr) -> Self {
        self.conditions.push(ConditionClause::when(body));
        self
    }

    /// Add an `unless` clause
    pub fn unless(mut self, body: Expr) -> Self {
        self.conditions.push(ConditionClause::unless(body));
        self
    }

    /// Add an annotation
    pub fn annotate(mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) -> Self {
        Arc::make_mut(&mut self.annotations).insert(key, value);
        self
    }

    /// Get the `Effect` of this policy
    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Get the principal scope constraint
    pub fn principal_constraint(&self) -> &PrincipalOrResourceConstraint {
        &self.principal
    }

    /// Get the action scope constraint
    pub fn action_constraint(&self) -> &ActionConstraint {
        &self.action
    }

    /// Get the resource scope constraint
    pub fn resource_constraint(&self) -> &PrincipalOrResourceConstraint {
        &self.resource
    }

    /// Get the `when`/`unless` clauses, in order
    pub fn conditions(&self) -> &[ConditionClause] {
        &self.conditions
    }

    /// Get the annotations on this policy
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// List of open slots in this policy's scope constraints
    pub fn slots(&self) -> Vec<SlotId> {
        self.principal
            .slot()
            .into_iter()
            .chain(self.resource.slot())
            .collect()
    }

    /// Whether this policy is a template (has at least one open slot)
    pub fn is_template(&self) -> bool {
        !self.slots().is_empty()
    }

    /// Render a template into a concrete policy by substituting an
    /// `EntityUID` for every open slot. The binding must cover exactly the
    /// template's slots. The template itself is unchanged; linked policies
    /// are indistinguishable from hand-written ones.
    pub fn link(&self, values: &HashMap<SlotId, EntityUID>) -> Result<Policy, LinkingError> {
        let slots = self.slots();
        if let Some(slot) = values.keys().find(|slot| !slots.contains(*slot)) {
            return Err(LinkingError::UnknownSlot { slot: *slot });
        }
        // with unknown ids rejected, equal counts mean every slot is bound
        if values.len() != slots.len() {
            return Err(LinkingError::SlotCountMismatch {
                expected: slots.len(),
                got: values.len(),
            });
        }
        Ok(Policy {
            effect: self.effect,
            principal: self.principal.link(values),
            action: self.action.clone(),
            resource: self.resource.link(values),
            conditions: self.conditions.clone(),
            annotations: Arc::clone(&self.annotations),
        })
    }
}

/// Errors rendering a template into a concrete policy
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic, Error)]
pub enum LinkingError {
    /// The number of bound slot values does not match the template's slot
    /// count
    #[error("wrong number of slot values: expected {expected}, got {got}")]
    SlotCountMismatch {
        /// how many slots the template has
        expected: usize,
        /// how many values were provided
        got: usize,
    },

    /// A value was provided for a slot the template does not have
    #[error("value provided for unknown slot `{slot}`")]
    UnknownSlot {
        /// the offending slot identifier
        slot: SlotId,
    },
}

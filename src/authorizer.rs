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

//! This module contains the Cedar "authorizer", which implements the actual
//! authorization logic.
//!
//! Together with the evaluator and entity store, this comprises the
//! "authorization engine".

use crate::ast::{Effect, Expr, Policy, PolicyID, PolicySet, Request, Var};
use crate::entities::Entities;
use crate::evaluator::{EvaluationError, Evaluator};
use crate::extensions::Extensions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authorizer
#[derive(Debug, Clone)]
pub struct Authorizer {
    /// Extensions which will be used during requests to this `Authorizer`
    extensions: Extensions<'static>,
}

impl Authorizer {
    /// Create a new `Authorizer`
    pub fn new() -> Self {
        Self {
            extensions: Extensions::all_available(), // set at compile time
        }
    }

    /// Returns an authorization response for `q` with respect to the given
    /// `PolicySet` and `Entities`.
    ///
    /// A policy applies when its scope constraints match the request and
    /// its conditions hold. Any `Forbid` that applies forces `Deny`;
    /// otherwise any `Permit` that applies gives `Allow`; otherwise `Deny`.
    /// A policy that errors during evaluation is skipped (as if it did not
    /// exist) and the error is reported in the diagnostics.
    pub fn is_authorized(&self, q: &Request, pset: &PolicySet, entities: &Entities) -> Response {
        self.is_authorized_masked(q, pset, entities, &IgnoreMask::NONE)
    }

    /// `is_authorized`, with some request parts possibly masked out by the
    /// batch evaluator's `Ignore` marker. A masked part always satisfies
    /// its scope constraint; a condition clause reading a masked part
    /// satisfies a `Permit` policy but makes a `Forbid` policy
    /// inapplicable, so that masking can only widen the set of permits.
    pub(crate) fn is_authorized_masked(
        &self,
        q: &Request,
        pset: &PolicySet,
        entities: &Entities,
        mask: &IgnoreMask,
    ) -> Response {
        let eval = Evaluator::new(q, entities, self.extensions);

        let mut satisfied_permits = vec![];
        let mut satisfied_forbids = vec![];
        let mut errors = vec![];

        for (id, p) in pset.policies() {
            match Self::applies(&eval, p, mask) {
                Ok(true) => match p.effect() {
                    Effect::Permit => satisfied_permits.push(id.clone()),
                    Effect::Forbid => satisfied_forbids.push(id.clone()),
                },
                Ok(false) => {}
                Err(error) => errors.push(AuthorizationError {
                    id: id.clone(),
                    error,
                }),
            }
        }

        if !satisfied_forbids.is_empty() {
            Response::new(Decision::Deny, satisfied_forbids, errors)
        } else if !satisfied_permits.is_empty() {
            Response::new(Decision::Allow, satisfied_permits, errors)
        } else {
            Response::new(Decision::Deny, vec![], errors)
        }
    }

    fn applies(
        eval: &Evaluator<'_>,
        p: &Policy,
        mask: &IgnoreMask,
    ) -> Result<bool, EvaluationError> {
        if !mask.principal && !eval.principal_matches(p.principal_constraint())? {
            return Ok(false);
        }
        if !mask.action && !eval.action_matches(p.action_constraint()) {
            return Ok(false);
        }
        if !mask.resource && !eval.resource_matches(p.resource_constraint())? {
            return Ok(false);
        }
        for clause in p.conditions() {
            if mask.reads_masked_part(clause.body()) {
                match p.effect() {
                    Effect::Permit => continue,
                    Effect::Forbid => return Ok(false),
                }
            }
            if !eval.condition_holds(clause)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Which request parts are masked out (treated as ignored) for an
/// authorization call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct IgnoreMask {
    /// Ignore the principal part
    pub principal: bool,
    /// Ignore the action part
    pub action: bool,
    /// Ignore the resource part
    pub resource: bool,
    /// Ignore the context part
    pub context: bool,
}

impl IgnoreMask {
    /// The mask that ignores nothing
    pub const NONE: IgnoreMask = IgnoreMask {
        principal: false,
        action: false,
        resource: false,
        context: false,
    };

    fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Whether the expression reads any masked request part
    fn reads_masked_part(&self, e: &Expr) -> bool {
        if self.is_none() {
            return false;
        }
        (self.principal && e.contains_var(Var::Principal))
            || (self.action && e.contains_var(Var::Action))
            || (self.resource && e.contains_var(Var::Resource))
            || (self.context && e.contains_var(Var::Context))
    }
}

/// Authorization response returned from the `Authorizer`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Response {
    /// Authorization decision
    pub decision: Decision,
    /// Diagnostics providing more information on how this decision was
    /// reached
    pub diagnostics: Diagnostics,
}

impl Response {
    /// Create a new `Response`
    pub fn new(decision: Decision, reason: Vec<PolicyID>, errors: Vec<AuthorizationError>) -> Self {
        Response {
            decision,
            diagnostics: Diagnostics { reason, errors },
        }
    }
}

/// Diagnostics providing more information on how a `Decision` was reached
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Diagnostics {
    /// `PolicyID`s of the policies that contributed to the decision, in
    /// policy-set order. If no policies applied to the request, this will
    /// be empty.
    pub reason: Vec<PolicyID>,
    /// List of errors that occurred, in policy-set order. Errors never
    /// abort authorization; the erroring policy is simply inapplicable.
    pub errors: Vec<AuthorizationError>,
}

/// Decision returned from the `Authorizer`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    /// The `Authorizer` determined that the request should be allowed
    Allow,
    /// The `Authorizer` determined that the request should be denied.
    Deny,
}

/// An error that occurred evaluating one policy during authorization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("while evaluating policy `{id}`: {error}")]
pub struct AuthorizationError {
    /// Id of the policy where the error occurred
    pub id: PolicyID,
    /// The evaluation error itself
    pub error: EvaluationError,
}

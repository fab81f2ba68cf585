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

//! This module contains the batch evaluator: it authorizes one policy set
//! over a family of requests generated by substituting variable bindings
//! into a request skeleton, streaming each result through a callback.
//!
//! The evaluation is single-threaded and cooperative: the callback runs on
//! the caller's thread in enumeration order, and a [`Cancellation`] token
//! is observed between successive requests.

pub mod err;
pub use err::{BatchError, Part};

use crate::ast::{self, Context, EntityUID, Literal, PolicySet, Value};
use crate::authorizer::{Authorizer, Decision, Diagnostics, IgnoreMask};
use crate::entities::Entities;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reserved record key marking a `Variable` placeholder
const VARIABLE_KEY: &str = "__cedar::variable";
/// Reserved record key marking an `Ignore` placeholder
const IGNORE_KEY: &str = "__cedar::ignore";

/// Create a `Variable` placeholder value. It may stand for a whole request
/// part, or nest inside records and sets in the context.
pub fn variable(name: impl Into<SmolStr>) -> Value {
    Value::record([(VARIABLE_KEY, Value::from(name.into()))])
}

/// Create an `Ignore` placeholder value. A request part marked `Ignore`
/// always satisfies its scope constraint; condition clauses reading it are
/// resolved in favor of `Permit` policies (and disable `Forbid` policies
/// that read it).
pub fn ignore() -> Value {
    Value::record([(IGNORE_KEY, Value::from(true))])
}

fn as_variable(v: &Value) -> Option<&SmolStr> {
    if let Value::Record(map) = v {
        if map.len() == 1 {
            if let Some(Value::Lit(Literal::String(name))) = map.get(VARIABLE_KEY) {
                return Some(name);
            }
        }
    }
    None
}

fn is_ignore(v: &Value) -> bool {
    matches!(v, Value::Record(map) if map.len() == 1 && map.contains_key(IGNORE_KEY))
}

/// Variable bindings for a batch request: each named variable takes every
/// value in its list. Binding lists keep their input order during
/// enumeration; names enumerate in lexicographic order.
pub type Variables = BTreeMap<SmolStr, Vec<Value>>;

/// A concrete assignment of batch variables, as delivered to the callback.
pub type Values = BTreeMap<SmolStr, Value>;

/// A batch authorization request: each part may be a concrete value, a
/// [`variable`] placeholder, or [`ignore`]. `None` parts are an error
/// (surfacing as [`BatchError::MissingPart`] once enumeration reaches
/// them).
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// The principal: an entity, `variable`, or `ignore`
    pub principal: Option<Value>,
    /// The action: an entity, `variable`, or `ignore`
    pub action: Option<Value>,
    /// The resource: an entity, `variable`, or `ignore`
    pub resource: Option<Value>,
    /// The context: a record (possibly containing nested `variable`s),
    /// `variable`, or `ignore`
    pub context: Option<Value>,
    /// Binding lists for every variable referenced by the parts above
    pub variables: Variables,
}

/// The outcome of one enumerated request, delivered to the callback.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// The concrete request that was authorized. Ignored parts carry an
    /// empty entity UID (principal/action/resource) or an empty record
    /// (context).
    pub request: ast::Request,
    /// The decision for this request
    pub decision: Decision,
    /// Reasons and per-policy errors for this request
    pub diagnostics: Diagnostics,
    /// An independent snapshot of the variable bindings that produced this
    /// request
    pub values: Values,
}

/// A clonable cancellation token. Cancelling stops a running batch between
/// enumerated requests; at least one result may already have been
/// delivered before cancellation is observed.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// Create a fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Collect the names of all `Variable` placeholders in `v` into `found`
fn find_variables(found: &mut BTreeSet<SmolStr>, v: &Value) {
    if let Some(name) = as_variable(v) {
        found.insert(name.clone());
        return;
    }
    match v {
        Value::Record(map) => {
            for item in map.values() {
                find_variables(found, item);
            }
        }
        Value::Set(set) => {
            for item in set.iter() {
                find_variables(found, item);
            }
        }
        _ => {}
    }
}

/// Whether `v` contains a `Variable` placeholder with the given name
fn mentions(v: &Value, var: &SmolStr) -> bool {
    if let Some(name) = as_variable(v) {
        return name == var;
    }
    match v {
        Value::Record(map) => map.values().any(|item| mentions(item, var)),
        Value::Set(set) => set.iter().any(|item| mentions(item, var)),
        _ => false,
    }
}

/// Substitute `new` for every `Variable(var)` in `v`, returning the new
/// value and whether anything changed. The no-change path returns the
/// input value itself (an O(1) clone of the same allocation), so unchanged
/// records and sets keep their identity.
fn clone_sub(v: &Value, var: &SmolStr, new: &Value) -> (Value, bool) {
    if !mentions(v, var) {
        return (v.clone(), false);
    }
    if as_variable(v).is_some() {
        return (new.clone(), true);
    }
    match v {
        Value::Record(map) => {
            let subbed = map
                .iter()
                .map(|(k, item)| (k.clone(), clone_sub(item, var, new).0))
                .collect::<BTreeMap<SmolStr, Value>>();
            (Value::Record(Arc::new(subbed)), true)
        }
        Value::Set(set) => (
            Value::set(set.iter().map(|item| clone_sub(item, var, new).0)),
            true,
        ),
        // `mentions` only returns true for variables, records, and sets
        _ => (v.clone(), false),
    }
}

fn substitute(v: &Value, values: &Values) -> Value {
    let mut out = v.clone();
    for (name, binding) in values {
        out = clone_sub(&out, name, binding).0;
    }
    out
}

/// Authorize the Cartesian product of the variable bindings in `request`
/// against the given policies and entities, invoking `callback` with each
/// result.
///
/// Enumeration is deterministic: variable names in lexicographic order,
/// with each binding list iterated in input order (the last name varies
/// fastest). The callback receives independent snapshots; the engine keeps
/// no references to them.
///
/// Validation errors ([`BatchError::UnboundVariable`],
/// [`BatchError::UnusedVariable`]) are detected before any result is
/// delivered. [`BatchError::MissingPart`] and [`BatchError::InvalidPart`]
/// surface when an enumerated request is built. Cancellation is observed
/// before each enumerated request and aborts with
/// [`BatchError::Cancelled`].
pub fn authorize(
    cancel: &Cancellation,
    pset: &PolicySet,
    entities: &Entities,
    request: Request,
    mut callback: impl FnMut(BatchResult),
) -> Result<(), BatchError> {
    // every referenced variable must be bound, and every bound variable
    // must be referenced
    let mut used = BTreeSet::new();
    for part in [
        &request.principal,
        &request.action,
        &request.resource,
        &request.context,
    ]
    .into_iter()
    .flatten()
    {
        find_variables(&mut used, part);
    }
    if let Some(name) = used.iter().find(|n| !request.variables.contains_key(*n)) {
        return Err(BatchError::UnboundVariable(name.clone()));
    }
    if let Some(name) = request.variables.keys().find(|n| !used.contains(*n)) {
        return Err(BatchError::UnusedVariable(name.clone()));
    }

    // ignore markers appear only at the top level of a part
    let mask = IgnoreMask {
        principal: request.principal.as_ref().is_some_and(is_ignore),
        action: request.action.as_ref().is_some_and(is_ignore),
        resource: request.resource.as_ref().is_some_and(is_ignore),
        context: request.context.as_ref().is_some_and(is_ignore),
    };

    let names: Vec<&SmolStr> = used.iter().collect();
    let mut pools: Vec<&[Value]> = Vec::with_capacity(names.len());
    for name in &names {
        match request.variables.get(*name) {
            Some(values) => pools.push(values.as_slice()),
            None => return Err(BatchError::UnboundVariable((*name).clone())),
        }
    }
    // an empty binding list makes the whole product empty
    if pools.iter().any(|pool| pool.is_empty()) {
        return Ok(());
    }

    let authorizer = Authorizer::new();
    let mut indices = vec![0usize; names.len()];
    loop {
        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let values: Values = itertools::izip!(&names, &pools, &indices)
            .filter_map(|(name, pool, &i)| pool.get(i).map(|v| ((*name).clone(), v.clone())))
            .collect();

        let principal = build_uid_part(&request.principal, Part::Principal, &values)?;
        let action = build_uid_part(&request.action, Part::Action, &values)?;
        let resource = build_uid_part(&request.resource, Part::Resource, &values)?;
        let context = build_context_part(&request.context, &values)?;
        let concrete = ast::Request::new(principal, action, resource, context);

        let response = authorizer.is_authorized_masked(&concrete, pset, entities, &mask);
        callback(BatchResult {
            request: concrete,
            decision: response.decision,
            diagnostics: response.diagnostics,
            values,
        });

        // odometer: the last (lexicographically greatest) name varies fastest
        let mut k = names.len();
        loop {
            if k == 0 {
                return Ok(());
            }
            k -= 1;
            indices[k] += 1;
            if indices[k] < pools[k].len() {
                break;
            }
            indices[k] = 0;
        }
    }
}

fn build_uid_part(
    part: &Option<Value>,
    which: Part,
    values: &Values,
) -> Result<EntityUID, BatchError> {
    let v = part.as_ref().ok_or(BatchError::MissingPart(which))?;
    if is_ignore(v) {
        // placeholder; the corresponding scope and condition checks are
        // masked out, so this UID is never consulted
        return Ok(EntityUID::new("", ""));
    }
    match substitute(v, values) {
        Value::Lit(Literal::EntityUID(uid)) => Ok(uid.as_ref().clone()),
        _ => Err(BatchError::InvalidPart(which)),
    }
}

fn build_context_part(part: &Option<Value>, values: &Values) -> Result<Context, BatchError> {
    let v = part.as_ref().ok_or(BatchError::MissingPart(Part::Context))?;
    if is_ignore(v) {
        return Ok(Context::empty());
    }
    match substitute(v, values) {
        Value::Record(record) => Ok(Context::from(record)),
        _ => Err(BatchError::InvalidPart(Part::Context)),
    }
}

// PANIC SAFETY: Unit Test Code
#[allow(clippy::panic)]
#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{Expr, Policy, PolicyID, Var};
    use cool_asserts::assert_matches;

    fn uid(ty: &str, id: &str) -> EntityUID {
        EntityUID::new(ty, id)
    }

    fn euid_val(ty: &str, id: &str) -> Value {
        Value::from(uid(ty, id))
    }

    fn run(
        pset: &PolicySet,
        entities: &Entities,
        request: Request,
    ) -> Result<Vec<BatchResult>, BatchError> {
        let mut out = vec![];
        authorize(&Cancellation::new(), pset, entities, request, |r| {
            out.push(r)
        })?;
        Ok(out)
    }

    fn single_policy(p: Policy) -> PolicySet {
        let mut pset = PolicySet::new();
        pset.store("0", p);
        pset
    }

    #[test]
    fn smoke_test() {
        let pset = single_policy(Policy::permit());
        let results = run(
            &pset,
            &Entities::new(),
            Request {
                principal: Some(euid_val("P", "1")),
                action: Some(variable("action")),
                resource: Some(variable("resource")),
                context: Some(Value::empty_record()),
                variables: Variables::from([
                    (
                        "action".into(),
                        vec![euid_val("A", "1"), euid_val("A", "2")],
                    ),
                    (
                        "resource".into(),
                        vec![
                            euid_val("R", "1"),
                            euid_val("R", "2"),
                            euid_val("R", "3"),
                        ],
                    ),
                ]),
            },
        )
        .unwrap();

        assert_eq!(results.len(), 6);
        for r in &results {
            assert_eq!(r.decision, Decision::Allow);
            assert_eq!(r.diagnostics.reason, vec![PolicyID::new("0")]);
            assert_eq!(r.request.principal().as_ref(), &uid("P", "1"));
            // the values snapshot matches the request that was authorized
            assert_eq!(
                r.values.get("action"),
                Some(&Value::from(r.request.action().as_ref().clone()))
            );
            assert_eq!(
                r.values.get("resource"),
                Some(&Value::from(r.request.resource().as_ref().clone()))
            );
        }
        // deterministic enumeration: names sorted, last name varies fastest
        let order: Vec<(String, String)> = results
            .iter()
            .map(|r| {
                (
                    r.request.action().eid().to_string(),
                    r.request.resource().eid().to_string(),
                )
            })
            .collect();
        let expected: Vec<(String, String)> = [
            ("1", "1"),
            ("1", "2"),
            ("1", "3"),
            ("2", "1"),
            ("2", "2"),
            ("2", "3"),
        ]
        .iter()
        .map(|(a, r)| (a.to_string(), r.to_string()))
        .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn some_ok() {
        let pset = single_policy(
            Policy::permit()
                .principal_eq(uid("P", "1"))
                .action_eq(uid("A", "2"))
                .resource_eq(uid("R", "3")),
        );
        let mut allows = vec![];
        let mut total = 0;
        authorize(
            &Cancellation::new(),
            &pset,
            &Entities::new(),
            Request {
                principal: Some(euid_val("P", "1")),
                action: Some(variable("action")),
                resource: Some(variable("resource")),
                context: Some(Value::empty_record()),
                variables: Variables::from([
                    (
                        "action".into(),
                        vec![euid_val("A", "1"), euid_val("A", "2")],
                    ),
                    (
                        "resource".into(),
                        vec![
                            euid_val("R", "1"),
                            euid_val("R", "2"),
                            euid_val("R", "3"),
                        ],
                    ),
                ]),
            },
            |r| {
                total += 1;
                if r.decision == Decision::Allow {
                    allows.push(r);
                }
            },
        )
        .unwrap();

        assert_eq!(total, 6);
        assert_eq!(allows.len(), 1);
        let winner = &allows[0];
        assert_eq!(winner.request.action().as_ref(), &uid("A", "2"));
        assert_eq!(winner.request.resource().as_ref(), &uid("R", "3"));
        assert_eq!(winner.diagnostics.reason, vec![PolicyID::new("0")]);
        assert_eq!(
            winner.values,
            Values::from([
                ("action".into(), euid_val("A", "2")),
                ("resource".into(), euid_val("R", "3")),
            ])
        );
    }

    #[test]
    fn attribute_access() {
        use crate::ast::Entity;
        let entities = Entities::from_entities([
            Entity::new(
                uid("P", "1"),
                [(
                    "tags".into(),
                    Value::record([("a", Value::from("a"))]),
                )],
                [],
            ),
            Entity::new(
                uid("P", "2"),
                [(
                    "tags".into(),
                    Value::record([("b", Value::from("b"))]),
                )],
                [],
            ),
        ]);
        let principal_tags = Expr::get_attr(Expr::var(Var::Principal), "tags");
        let pset = single_policy(Policy::permit().when(Expr::and(
            Expr::has_attr(principal_tags.clone(), "a"),
            Expr::is_eq(
                Expr::get_attr(principal_tags, "a"),
                Expr::val("a"),
            ),
        )));
        let results = run(
            &pset,
            &entities,
            Request {
                principal: Some(variable("principal")),
                action: Some(euid_val("A", "1")),
                resource: Some(variable("resource")),
                context: Some(Value::empty_record()),
                variables: Variables::from([
                    (
                        "principal".into(),
                        vec![euid_val("P", "1"), euid_val("P", "2")],
                    ),
                    (
                        "resource".into(),
                        vec![euid_val("R", "1"), euid_val("R", "2")],
                    ),
                ]),
            },
        )
        .unwrap();

        assert_eq!(results.len(), 4);
        for r in &results {
            let expect = if r.request.principal().as_ref() == &uid("P", "1") {
                Decision::Allow
            } else {
                Decision::Deny
            };
            assert_eq!(r.decision, expect);
            assert!(r.diagnostics.errors.is_empty());
        }
    }

    #[test]
    fn variable_context() {
        let pset = single_policy(Policy::permit().when(Expr::is_eq(
            Expr::get_attr(Expr::var(Var::Context), "key"),
            Expr::val(42),
        )));
        let ctx = |n: i64| Value::record([("key", Value::from(n))]);
        let results = run(
            &pset,
            &Entities::new(),
            Request {
                principal: Some(euid_val("P", "1")),
                action: Some(euid_val("A", "1")),
                resource: Some(euid_val("R", "1")),
                context: Some(variable("context")),
                variables: Variables::from([(
                    "context".into(),
                    vec![ctx(41), ctx(42), ctx(43)],
                )]),
            },
        )
        .unwrap();
        assert_eq!(results.len(), 3);
        let allowed: Vec<_> = results
            .iter()
            .filter(|r| r.decision == Decision::Allow)
            .collect();
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].values.get("context"), Some(&ctx(42)));
        assert_eq!(allowed[0].request.context().as_value(), ctx(42));
    }

    #[test]
    fn variable_nested_in_context_record() {
        let pset = single_policy(Policy::permit().when(Expr::is_eq(
            Expr::get_attr(Expr::var(Var::Context), "key"),
            Expr::val(42),
        )));
        let results = run(
            &pset,
            &Entities::new(),
            Request {
                principal: Some(euid_val("P", "1")),
                action: Some(euid_val("A", "1")),
                resource: Some(euid_val("R", "1")),
                context: Some(Value::record([("key", variable("key"))])),
                variables: Variables::from([(
                    "key".into(),
                    vec![Value::from(41), Value::from(42), Value::from(43)],
                )]),
            },
        )
        .unwrap();
        assert_eq!(results.len(), 3);
        let allowed: Vec<_> = results
            .iter()
            .filter(|r| r.decision == Decision::Allow)
            .collect();
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].values.get("key"), Some(&Value::from(42)));
        assert_eq!(
            allowed[0].request.context().as_value(),
            Value::record([("key", Value::from(42))])
        );
    }

    #[test]
    fn ignored_context_softens_conditions() {
        let pset = single_policy(
            Policy::permit()
                .when(Expr::is_eq(
                    Expr::get_attr(Expr::var(Var::Context), "key"),
                    Expr::val(42),
                ))
                .when(Expr::is_eq(
                    Expr::var(Var::Principal),
                    Expr::val(uid("P", "1")),
                ))
                .when(Expr::is_eq(
                    Expr::var(Var::Action),
                    Expr::val(uid("A", "1")),
                ))
                .when(Expr::is_eq(
                    Expr::var(Var::Resource),
                    Expr::val(uid("R", "2")),
                )),
        );
        let results = run(
            &pset,
            &Entities::new(),
            Request {
                principal: Some(euid_val("P", "1")),
                action: Some(euid_val("A", "1")),
                resource: Some(variable("resource")),
                context: Some(ignore()),
                variables: Variables::from([(
                    "resource".into(),
                    vec![euid_val("R", "1"), euid_val("R", "2")],
                )]),
            },
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        for r in &results {
            let expect = if r.request.resource().as_ref() == &uid("R", "2") {
                Decision::Allow
            } else {
                Decision::Deny
            };
            assert_eq!(r.decision, expect);
            assert!(r.diagnostics.errors.is_empty());
        }
    }

    #[test]
    fn per_policy_errors_are_reported() {
        let pset = single_policy(
            Policy::permit().when(Expr::less(Expr::val("test"), Expr::val(42))),
        );
        let results = run(
            &pset,
            &Entities::new(),
            Request {
                principal: Some(variable("principal")),
                action: Some(variable("action")),
                resource: Some(variable("resource")),
                context: Some(Value::empty_record()),
                variables: Variables::from([
                    ("principal".into(), vec![euid_val("P", "1")]),
                    ("action".into(), vec![euid_val("A", "1")]),
                    ("resource".into(), vec![euid_val("R", "1")]),
                ]),
            },
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].decision, Decision::Deny);
        assert_eq!(results[0].diagnostics.errors.len(), 1);
        assert_eq!(results[0].diagnostics.errors[0].id, PolicyID::new("0"));
    }

    #[test]
    fn unbound_variable() {
        let err = run(
            &PolicySet::new(),
            &Entities::new(),
            Request {
                principal: Some(variable("bananas")),
                ..Request::default()
            },
        );
        assert_matches!(err, Err(BatchError::UnboundVariable(name)) => {
            assert_eq!(name, "bananas");
        });
    }

    #[test]
    fn unused_variable() {
        let err = run(
            &PolicySet::new(),
            &Entities::new(),
            Request {
                variables: Variables::from([("bananas".into(), vec![Value::from("test")])]),
                ..Request::default()
            },
        );
        assert_matches!(err, Err(BatchError::UnusedVariable(name)) => {
            assert_eq!(name, "bananas");
        });
    }

    #[test]
    fn empty_binding_list_yields_no_results() {
        let results = run(
            &PolicySet::new(),
            &Entities::new(),
            Request {
                principal: Some(variable("bananas")),
                variables: Variables::from([("bananas".into(), vec![])]),
                ..Request::default()
            },
        )
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn missing_parts() {
        let complete = || Request {
            principal: Some(euid_val("Principal", "principal")),
            action: Some(euid_val("Action", "action")),
            resource: Some(euid_val("Resource", "resource")),
            context: Some(Value::empty_record()),
            variables: Variables::new(),
        };
        for (part, strip) in [
            (
                Part::Principal,
                Box::new(|r: &mut Request| r.principal = None) as Box<dyn Fn(&mut Request)>,
            ),
            (Part::Action, Box::new(|r: &mut Request| r.action = None)),
            (Part::Resource, Box::new(|r: &mut Request| r.resource = None)),
            (Part::Context, Box::new(|r: &mut Request| r.context = None)),
        ] {
            let mut request = complete();
            strip(&mut request);
            assert_matches!(
                run(&PolicySet::new(), &Entities::new(), request),
                Err(BatchError::MissingPart(p)) => assert_eq!(p, part)
            );
        }
    }

    #[test]
    fn invalid_parts() {
        let complete = || Request {
            principal: Some(euid_val("Principal", "principal")),
            action: Some(euid_val("Action", "action")),
            resource: Some(euid_val("Resource", "resource")),
            context: Some(Value::empty_record()),
            variables: Variables::new(),
        };
        for (part, poison) in [
            (
                Part::Principal,
                Box::new(|r: &mut Request| r.principal = Some(Value::from("invalid")))
                    as Box<dyn Fn(&mut Request)>,
            ),
            (
                Part::Action,
                Box::new(|r: &mut Request| r.action = Some(Value::from("invalid"))),
            ),
            (
                Part::Resource,
                Box::new(|r: &mut Request| r.resource = Some(Value::from("invalid"))),
            ),
            (
                Part::Context,
                Box::new(|r: &mut Request| r.context = Some(Value::from("invalid"))),
            ),
        ] {
            let mut request = complete();
            poison(&mut request);
            assert_matches!(
                run(&PolicySet::new(), &Entities::new(), request),
                Err(BatchError::InvalidPart(p)) => assert_eq!(p, part)
            );
        }
    }

    #[test]
    fn cancelled_before_first_result() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let mut total = 0;
        let err = authorize(
            &cancel,
            &PolicySet::new(),
            &Entities::new(),
            Request {
                principal: Some(euid_val("Principal", "principal")),
                action: Some(euid_val("Action", "action")),
                resource: Some(euid_val("Resource", "resource")),
                context: Some(Value::empty_record()),
                variables: Variables::new(),
            },
            |_| total += 1,
        );
        assert_matches!(err, Err(BatchError::Cancelled));
        assert_eq!(total, 0);
    }

    #[test]
    fn cancelled_from_callback_after_first_result() {
        let cancel = Cancellation::new();
        let from_callback = cancel.clone();
        let mut total = 0;
        let err = authorize(
            &cancel,
            &PolicySet::new(),
            &Entities::new(),
            Request {
                principal: Some(euid_val("Principal", "principal")),
                action: Some(euid_val("Action", "action")),
                resource: Some(variable("resource")),
                context: Some(Value::empty_record()),
                variables: Variables::from([(
                    "resource".into(),
                    vec![
                        euid_val("Resource", "1"),
                        euid_val("Resource", "2"),
                        euid_val("Resource", "3"),
                    ],
                )]),
            },
            |_| {
                total += 1;
                from_callback.cancel();
            },
        );
        assert_matches!(err, Err(BatchError::Cancelled));
        assert_eq!(total, 1);
    }

    /// Build the shared multi-policy corpus for the ignore tests
    fn ignore_corpus() -> PolicySet {
        let bob = || uid("Principal", "bob");
        let alice = || uid("Principal", "alice");
        let eve = || uid("Principal", "eve");
        let access = || uid("Action", "access");
        let write = || uid("Action", "write");
        let drop_ = || uid("Action", "drop");
        let prod = || uid("Resource", "prod");
        let mitm = || uid("Resource", "mitm");
        let ctx_has_eq = |attr: &str, val: Expr| {
            Expr::and(
                Expr::has_attr(Expr::var(Var::Context), attr),
                Expr::is_eq(Expr::get_attr(Expr::var(Var::Context), attr), val),
            )
        };
        let mut pset = PolicySet::new();
        pset.store(
            "bob0",
            Policy::permit()
                .principal_eq(bob())
                .action_eq(access())
                .resource_eq(prod())
                .when(ctx_has_eq("device", Expr::val("good"))),
        );
        pset.store(
            "bob1",
            Policy::permit()
                .principal_eq(bob())
                .action_eq(access())
                .resource_eq(prod())
                .when(ctx_has_eq("onCall", Expr::val(true))),
        );
        pset.store(
            "bob2",
            Policy::forbid()
                .principal_eq(bob())
                .action_eq(access())
                .resource_eq(prod())
                .when(Expr::or(
                    Expr::not(Expr::has_attr(Expr::var(Var::Context), "device")),
                    Expr::is_eq(
                        Expr::get_attr(Expr::var(Var::Context), "device"),
                        Expr::val("bad"),
                    ),
                )),
        );
        pset.store(
            "bob3",
            Policy::forbid()
                .principal_eq(bob())
                .action_eq(access())
                .resource_eq(prod())
                .when(Expr::or(
                    Expr::not(Expr::has_attr(Expr::var(Var::Context), "location")),
                    Expr::is_eq(
                        Expr::get_attr(Expr::var(Var::Context), "location"),
                        Expr::val("unknown"),
                    ),
                )),
        );
        pset.store(
            "bob4",
            Policy::permit()
                .principal_eq(bob())
                .action_eq(write())
                .resource_eq(mitm()),
        );
        pset.store(
            "bob5-condition",
            Policy::permit()
                .action_eq(write())
                .resource_eq(mitm())
                .when(Expr::is_eq(Expr::var(Var::Principal), Expr::val(bob()))),
        );
        pset.store(
            "alice0",
            Policy::permit()
                .principal_eq(alice())
                .action_eq(access())
                .resource_eq(prod())
                .when(ctx_has_eq("device", Expr::val("good"))),
        );
        pset.store(
            "alice1",
            Policy::permit()
                .principal_eq(alice())
                .action_eq(drop_())
                .resource_eq(prod())
                .when(ctx_has_eq("device", Expr::val("good"))),
        );
        pset.store(
            "eve0",
            Policy::permit()
                .principal_eq(eve())
                .action_eq(drop_())
                .resource_eq(mitm())
                .when(ctx_has_eq("device", Expr::val("good"))),
        );
        pset.store(
            "spy0",
            Policy::permit()
                .principal_in(uid("Roles", "spy"))
                .action_eq(drop_())
                .resource_eq(prod()),
        );
        pset
    }

    #[track_caller]
    fn assert_ignore_case(
        request: Request,
        expected_decision: Decision,
        mut expected_reasons: Vec<&str>,
    ) {
        let pset = ignore_corpus();
        let results = run(&pset, &Entities::new(), request).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].decision, expected_decision);
        let mut reasons: Vec<&str> = results[0]
            .diagnostics
            .reason
            .iter()
            .map(|id| id.as_str())
            .collect();
        reasons.sort_unstable();
        expected_reasons.sort_unstable();
        assert_eq!(reasons, expected_reasons);
    }

    #[test]
    fn when_could_bob_access_prod_ignoring_context() {
        assert_ignore_case(
            Request {
                principal: Some(euid_val("Principal", "bob")),
                action: Some(euid_val("Action", "access")),
                resource: Some(euid_val("Resource", "prod")),
                context: Some(ignore()),
                variables: Variables::new(),
            },
            Decision::Allow,
            vec!["bob0", "bob1"],
        );
    }

    #[test]
    fn bob_is_forbidden() {
        assert_ignore_case(
            Request {
                principal: Some(euid_val("Principal", "bob")),
                action: Some(euid_val("Action", "access")),
                resource: Some(euid_val("Resource", "prod")),
                context: Some(Value::record([
                    ("location", Value::from("unknown")),
                    ("device", Value::from("bad")),
                ])),
                variables: Variables::new(),
            },
            Decision::Deny,
            vec!["bob2", "bob3"],
        );
    }

    #[test]
    fn can_anyone_access_prod_ignoring_context() {
        assert_ignore_case(
            Request {
                principal: Some(ignore()),
                action: Some(euid_val("Action", "access")),
                resource: Some(euid_val("Resource", "prod")),
                context: Some(ignore()),
                variables: Variables::new(),
            },
            Decision::Allow,
            vec!["bob0", "bob1", "alice0"],
        );
    }

    #[test]
    fn can_anyone_drop_prod_ignoring_context() {
        assert_ignore_case(
            Request {
                principal: Some(ignore()),
                action: Some(euid_val("Action", "drop")),
                resource: Some(euid_val("Resource", "prod")),
                context: Some(ignore()),
                variables: Variables::new(),
            },
            Decision::Allow,
            vec!["alice1", "spy0"],
        );
    }

    #[test]
    fn what_permit_policies_relate_to_drops() {
        assert_ignore_case(
            Request {
                principal: Some(ignore()),
                action: Some(euid_val("Action", "drop")),
                resource: Some(ignore()),
                context: Some(ignore()),
                variables: Variables::new(),
            },
            Decision::Allow,
            vec!["alice1", "eve0", "spy0"],
        );
    }

    #[test]
    fn what_permit_policies_relate_to_bob() {
        assert_ignore_case(
            Request {
                principal: Some(euid_val("Principal", "bob")),
                action: Some(ignore()),
                resource: Some(ignore()),
                context: Some(ignore()),
                variables: Variables::new(),
            },
            Decision::Allow,
            vec!["bob0", "bob1", "bob4", "bob5-condition"],
        );
    }

    #[test]
    fn clone_sub_substitutes_and_shares() {
        let bananas: SmolStr = "bananas".into();
        let hello = Value::from("hello");

        // a bare variable is replaced
        let (out, changed) = clone_sub(&variable("bananas"), &bananas, &hello);
        assert!(changed);
        assert_eq!(out, hello);

        // nested in a record
        let (out, changed) = clone_sub(
            &Value::record([("key", variable("bananas"))]),
            &bananas,
            &hello,
        );
        assert!(changed);
        assert_eq!(out, Value::record([("key", Value::from("hello"))]));

        // nested in a set
        let (out, changed) = clone_sub(&Value::set([variable("bananas")]), &bananas, &hello);
        assert!(changed);
        assert_eq!(out, Value::set([Value::from("hello")]));

        // a record mentioning a different variable is returned unchanged,
        // with its identity intact
        let rec = Value::record([("key", variable("asdf"))]);
        let (out, changed) = clone_sub(&rec, &bananas, &hello);
        assert!(!changed);
        assert_eq!(out, rec);
        assert_matches!((&rec, &out), (Value::Record(a), Value::Record(b)) => {
            assert!(Arc::ptr_eq(a, b));
        });

        // same for sets
        let set = Value::set([variable("asdf")]);
        let (out, changed) = clone_sub(&set, &bananas, &hello);
        assert!(!changed);
        assert_matches!((&set, &out), (Value::Set(a), Value::Set(b)) => {
            assert!(Arc::ptr_eq(&a.authoritative, &b.authoritative));
        });
    }

    #[test]
    fn find_variables_walks_nested_values() {
        let mut found = BTreeSet::new();
        find_variables(&mut found, &Value::record([("key", variable("bananas"))]));
        assert_eq!(found, BTreeSet::from(["bananas".into()]));

        let mut found = BTreeSet::new();
        find_variables(
            &mut found,
            &Value::set([variable("bananas"), variable("bananas")]),
        );
        assert_eq!(found, BTreeSet::from(["bananas".into()]));

        let mut found = BTreeSet::new();
        find_variables(&mut found, &Value::from("test"));
        assert!(found.is_empty());

        let mut found = BTreeSet::new();
        find_variables(
            &mut found,
            &Value::set([variable("bananas"), variable("test")]),
        );
        assert_eq!(found, BTreeSet::from(["bananas".into(), "test".into()]));
    }
}

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

//! This module contains the Cedar expression evaluator.

pub mod err;
pub use err::{EvaluationError, EvaluationErrorKind, IntegerOverflowError, Result};

use crate::ast::{
    ActionConstraint, BinaryOp, ConditionClause, ConditionKind, EntityReference, EntityUID, Expr,
    ExprKind, Literal, Policy, PrincipalOrResourceConstraint, Request, StaticallyTyped, Type,
    UnaryOp, Value, Var,
};
use crate::entities::{Dereference, Entities};
use crate::extensions::{Extensions, ExtensionValue};
use nonempty::nonempty;
use smol_str::SmolStr;
use std::sync::Arc;

/// Evaluator object.
///
/// Conceptually keeps the evaluation environment as part of its internal
/// state, because we will be repeatedly invoking the evaluator on every
/// policy in a set. A pure function over its immutable inputs: concurrent
/// evaluations against the same `Entities` need no synchronization.
pub struct Evaluator<'e> {
    /// `Principal` for the current request
    principal: Arc<EntityUID>,
    /// `Action` for the current request
    action: Arc<EntityUID>,
    /// `Resource` for the current request
    resource: Arc<EntityUID>,
    /// `Context` for the current request, as a Record value
    context: Value,
    /// Entities which we use to resolve entity references.
    ///
    /// This is a reference, because the `Evaluator` doesn't need ownership
    /// of (or need to modify) the `Entities`. One advantage of this is that
    /// you could create multiple `Evaluator`s without copying the
    /// `Entities`.
    entities: &'e Entities,
    /// Extensions which are active for this evaluation
    extensions: Extensions<'e>,
}

impl<'e> Evaluator<'e> {
    /// Create a fresh `Evaluator` for the given `request`, which uses the
    /// given `Entities` to resolve entity references. Use the given
    /// `Extensions` when evaluating.
    pub fn new(q: &Request, entities: &'e Entities, extensions: Extensions<'e>) -> Self {
        Self {
            principal: Arc::clone(q.principal()),
            action: Arc::clone(q.action()),
            resource: Arc::clone(q.resource()),
            context: q.context().as_value(),
            entities,
            extensions,
        }
    }

    /// Evaluate the given `Policy`, returning either a bool or an error.
    /// The bool indicates whether the policy applies, ie, "is satisfied"
    /// for the current `request`: its scope constraints all match, every
    /// `when` clause is `true`, and every `unless` clause is `false`.
    ///
    /// This is _different than_ "if the current `request` should be
    /// allowed" -- it doesn't consider whether we're processing a `Permit`
    /// policy or a `Forbid` policy.
    pub fn evaluate(&self, p: &Policy) -> Result<bool> {
        if !self.scope_matches(p)? {
            return Ok(false);
        }
        for clause in p.conditions() {
            if !self.condition_holds(clause)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether all three scope constraints of the policy match the request.
    /// Scope matching is infallible except for unlinked template slots.
    pub fn scope_matches(&self, p: &Policy) -> Result<bool> {
        Ok(self.principal_matches(p.principal_constraint())?
            && self.action_matches(p.action_constraint())
            && self.resource_matches(p.resource_constraint())?)
    }

    /// Whether the principal scope constraint matches the request principal
    pub fn principal_matches(&self, c: &PrincipalOrResourceConstraint) -> Result<bool> {
        self.uid_matches(c, &self.principal)
    }

    /// Whether the resource scope constraint matches the request resource
    pub fn resource_matches(&self, c: &PrincipalOrResourceConstraint) -> Result<bool> {
        self.uid_matches(c, &self.resource)
    }

    /// Whether the action scope constraint matches the request action
    pub fn action_matches(&self, c: &ActionConstraint) -> bool {
        match c {
            ActionConstraint::Any => true,
            ActionConstraint::Eq(uid) => self.action.as_ref() == uid.as_ref(),
            ActionConstraint::In(uids) => uids
                .iter()
                .any(|uid| self.entities.in_hierarchy(&self.action, uid)),
        }
    }

    fn uid_matches(&self, c: &PrincipalOrResourceConstraint, uid: &EntityUID) -> Result<bool> {
        Ok(match c {
            PrincipalOrResourceConstraint::Any => true,
            PrincipalOrResourceConstraint::Eq(r) => uid == self.deref_entity_reference(r)?,
            PrincipalOrResourceConstraint::In(r) => self
                .entities
                .in_hierarchy(uid, self.deref_entity_reference(r)?),
            PrincipalOrResourceConstraint::Is(ty) => Entities::is_of_type(uid, ty),
            PrincipalOrResourceConstraint::IsIn(ty, r) => {
                Entities::is_of_type(uid, ty)
                    && self
                        .entities
                        .in_hierarchy(uid, self.deref_entity_reference(r)?)
            }
        })
    }

    fn deref_entity_reference<'a>(&self, r: &'a EntityReference) -> Result<&'a EntityUID> {
        match r {
            EntityReference::EUID(uid) => Ok(uid),
            EntityReference::Slot(id) => Err(EvaluationError::unlinked_slot(*id)),
        }
    }

    /// Evaluate a single condition clause: `true` iff a `when` body is
    /// `true` or an `unless` body is `false`
    pub fn condition_holds(&self, clause: &ConditionClause) -> Result<bool> {
        let v = self.interpret(clause.body())?.get_as_bool()?;
        Ok(match clause.kind() {
            ConditionKind::When => v,
            ConditionKind::Unless => !v,
        })
    }

    /// Interpret an `Expr` into a `Value` in this evaluation environment.
    ///
    /// May return an error, for instance if the `Expr` tries to access an
    /// attribute that doesn't exist.
    pub fn interpret(&self, expr: &Expr) -> Result<Value> {
        match expr.expr_kind() {
            ExprKind::Lit(lit) => Ok(lit.clone().into()),
            ExprKind::Var(v) => match v {
                Var::Principal => Ok(Value::from(Arc::clone(&self.principal))),
                Var::Action => Ok(Value::from(Arc::clone(&self.action))),
                Var::Resource => Ok(Value::from(Arc::clone(&self.resource))),
                Var::Context => Ok(self.context.clone()),
            },
            ExprKind::If {
                test_expr,
                then_expr,
                else_expr,
            } => {
                // only the taken branch is evaluated
                if self.interpret(test_expr)?.get_as_bool()? {
                    self.interpret(then_expr)
                } else {
                    self.interpret(else_expr)
                }
            }
            ExprKind::And { left, right } => {
                if self.interpret(left)?.get_as_bool()? {
                    Ok(self.interpret(right)?.get_as_bool()?.into())
                } else {
                    // We can short circuit here: `false && X` is `false`
                    // even if `X` would error
                    Ok(false.into())
                }
            }
            ExprKind::Or { left, right } => {
                if self.interpret(left)?.get_as_bool()? {
                    // We can short circuit here
                    Ok(true.into())
                } else {
                    Ok(self.interpret(right)?.get_as_bool()?.into())
                }
            }
            ExprKind::UnaryApp { op, arg } => {
                let arg = self.interpret(arg)?;
                match op {
                    UnaryOp::Not => arg.get_as_bool().map(|b| (!b).into()),
                    UnaryOp::Neg => {
                        arg.get_as_long()?
                            .checked_neg()
                            .map(Value::from)
                            .ok_or_else(|| {
                                IntegerOverflowError::UnaryOp { op: *op, arg }.into()
                            })
                    }
                }
            }
            ExprKind::BinaryApp { op, arg1, arg2 } => {
                let (arg1, arg2) = (self.interpret(arg1)?, self.interpret(arg2)?);
                match op {
                    BinaryOp::Eq => Ok((arg1 == arg2).into()),
                    BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
                        eval_comparison(*op, arg1, arg2)
                    }
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                        eval_arithmetic(*op, arg1, arg2)
                    }
                    BinaryOp::In => self.eval_in(arg1, arg2),
                    BinaryOp::Contains => {
                        Ok(arg1.get_as_set()?.contains(&arg2).into())
                    }
                    BinaryOp::ContainsAll => {
                        let (set1, set2) = (arg1.get_as_set()?, arg2.get_as_set()?);
                        match (&set1.fast, &set2.fast) {
                            (Some(s1), Some(s2)) => Ok(s2.is_subset(s1).into()),
                            _ => Ok(set2
                                .iter()
                                .all(|item| set1.authoritative.contains(item))
                                .into()),
                        }
                    }
                    BinaryOp::ContainsAny => {
                        let (set1, set2) = (arg1.get_as_set()?, arg2.get_as_set()?);
                        match (&set1.fast, &set2.fast) {
                            (Some(s1), Some(s2)) => Ok((!s1.is_disjoint(s2)).into()),
                            _ => Ok(set1
                                .iter()
                                .any(|item| set2.authoritative.contains(item))
                                .into()),
                        }
                    }
                }
            }
            ExprKind::ExtensionFunctionApp { fn_name, args } => {
                let efunc = self.extensions.func(fn_name)?;
                let args = args
                    .iter()
                    .map(|arg| self.interpret(arg))
                    .collect::<Result<Vec<_>>>()?;
                efunc.call(&args)
            }
            ExprKind::GetAttr { expr, attr } => self.get_attr(self.interpret(expr)?, attr),
            ExprKind::HasAttr { expr, attr } => self.has_attr(self.interpret(expr)?, attr),
            ExprKind::Like { expr, pattern } => {
                let v = self.interpret(expr)?;
                Ok(pattern.wildcard_match(v.get_as_string()?).into())
            }
            ExprKind::Is { expr, entity_type } => {
                let v = self.interpret(expr)?;
                Ok((v.get_as_entity()?.entity_type() == entity_type).into())
            }
            ExprKind::Set(items) => {
                let vals = items
                    .iter()
                    .map(|item| self.interpret(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::set(vals))
            }
            ExprKind::Record(map) => {
                let map = map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.interpret(v)?)))
                    .collect::<Result<Vec<(SmolStr, Value)>>>()?;
                Ok(Value::record(map))
            }
        }
    }

    /// Evaluate `arg1 in arg2`: hierarchy membership of an entity in an
    /// entity or any member of a set of entities
    fn eval_in(&self, arg1: Value, arg2: Value) -> Result<Value> {
        let uid1 = arg1.get_as_entity().map_err(|e| {
            with_advice(e, "the LHS of `in` should be an entity")
        })?;
        match &arg2 {
            Value::Lit(Literal::EntityUID(uid2)) => {
                Ok(self.entities.in_hierarchy(uid1, uid2).into())
            }
            Value::Set(set) => {
                for item in set.iter() {
                    let uid2 = item.get_as_entity().map_err(|e| {
                        with_advice(e, "the RHS of `in` should be an entity or set of entities")
                    })?;
                    if self.entities.in_hierarchy(uid1, uid2) {
                        return Ok(true.into());
                    }
                }
                Ok(false.into())
            }
            _ => Err(EvaluationError::type_error_with_advice(
                nonempty![Type::Entity, Type::Set],
                arg2.type_of(),
                "the RHS of `in` should be an entity or set of entities".into(),
            )),
        }
    }

    /// Get an attribute of an entity, or a field of a record. A missing
    /// entity and a missing attribute are both errors (distinct from
    /// `has`, which treats them as `false`).
    fn get_attr(&self, v: Value, attr: &SmolStr) -> Result<Value> {
        match v {
            Value::Record(record) => record
                .get(attr)
                .cloned()
                .ok_or_else(|| EvaluationError::record_attr_does_not_exist(attr.clone())),
            Value::Lit(Literal::EntityUID(uid)) => match self.entities.entity(&uid) {
                Dereference::NoSuchEntity => Err(EvaluationError::entity_does_not_exist(uid)),
                Dereference::Data(entity) => entity.get(attr).cloned().ok_or_else(|| {
                    EvaluationError::entity_attr_does_not_exist(uid.clone(), attr.clone())
                }),
            },
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Record, Type::Entity],
                v.type_of(),
            )),
        }
    }

    /// Whether the given record has the given field, or the given entity
    /// has the given attribute. A missing entity has no attributes.
    fn has_attr(&self, v: Value, attr: &SmolStr) -> Result<Value> {
        match v {
            Value::Record(record) => Ok(record.contains_key(attr).into()),
            Value::Lit(Literal::EntityUID(uid)) => match self.entities.entity(&uid) {
                Dereference::NoSuchEntity => Ok(false.into()),
                Dereference::Data(entity) => Ok(entity.get(attr).is_some().into()),
            },
            _ => Err(EvaluationError::type_error(
                nonempty![Type::Record, Type::Entity],
                v.type_of(),
            )),
        }
    }

}

impl std::fmt::Debug for Evaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Evaluator with principal = {:?}, action = {:?}, resource = {:?}>",
            &self.principal, &self.action, &self.resource
        )
    }
}

fn with_advice(e: EvaluationError, advice: &str) -> EvaluationError {
    match e.error_kind() {
        EvaluationErrorKind::TypeError { expected, actual } => {
            EvaluationError::type_error_with_advice(
                expected.clone(),
                actual.clone(),
                advice.into(),
            )
        }
        _ => e,
    }
}

/// `<`-family comparisons: both operands must be `Long`, or both the same
/// orderable extension type (decimal, datetime, duration)
fn eval_comparison(op: BinaryOp, arg1: Value, arg2: Value) -> Result<Value> {
    let ordering = match (&arg1, &arg2) {
        (Value::Lit(Literal::Long(i1)), Value::Lit(Literal::Long(i2))) => i1.cmp(i2),
        (Value::Ext(ev1), Value::Ext(ev2)) => match (ev1, ev2) {
            (ExtensionValue::Decimal(d1), ExtensionValue::Decimal(d2)) => d1.cmp(d2),
            (ExtensionValue::Datetime(t1), ExtensionValue::Datetime(t2)) => t1.cmp(t2),
            (ExtensionValue::Duration(d1), ExtensionValue::Duration(d2)) => d1.cmp(d2),
            _ => return Err(comparison_type_error(op, &arg2)),
        },
        (Value::Lit(Literal::Long(_)), _) => return Err(comparison_type_error(op, &arg2)),
        _ => return Err(comparison_type_error(op, &arg1)),
    };
    let b = match op {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::LessEq => ordering.is_le(),
        BinaryOp::Greater => ordering.is_gt(),
        BinaryOp::GreaterEq => ordering.is_ge(),
        // PANIC SAFETY only called with comparison operators
        _ => return Err(comparison_type_error(op, &arg1)),
    };
    Ok(b.into())
}

fn comparison_type_error(op: BinaryOp, culprit: &Value) -> EvaluationError {
    EvaluationError::type_error_with_advice(
        nonempty![
            Type::Long,
            Type::Extension {
                name: "decimal".into()
            },
            Type::Extension {
                name: "datetime".into()
            },
            Type::Extension {
                name: "duration".into()
            }
        ],
        culprit.type_of(),
        format!("operation `{op}` should have operands of the same orderable type"),
    )
}

/// Arithmetic on `Long`s with overflow checking
fn eval_arithmetic(op: BinaryOp, arg1: Value, arg2: Value) -> Result<Value> {
    let (i1, i2) = match (arg1.get_as_long(), arg2.get_as_long()) {
        (Ok(i1), Ok(i2)) => (i1, i2),
        (Err(e), _) | (_, Err(e)) => {
            return Err(with_advice(
                e,
                &format!("operation `{op}` should have integer operands"),
            ))
        }
    };
    let result = match op {
        BinaryOp::Add => i1.checked_add(i2),
        BinaryOp::Sub => i1.checked_sub(i2),
        BinaryOp::Mul => i1.checked_mul(i2),
        // PANIC SAFETY only called with arithmetic operators
        _ => None,
    };
    result
        .map(Value::from)
        .ok_or_else(|| IntegerOverflowError::BinaryOp { op, arg1, arg2 }.into())
}

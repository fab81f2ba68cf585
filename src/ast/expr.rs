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

use crate::ast::{EntityType, Literal, Pattern, PatternElem};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The four variables bound by the evaluation environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    /// the Principal of the given request
    Principal,
    /// the Action of the given request
    Action,
    /// the Resource of the given request
    Resource,
    /// the Context of the given request
    Context,
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Principal => write!(f, "principal"),
            Self::Action => write!(f, "action"),
            Self::Resource => write!(f, "resource"),
            Self::Context => write!(f, "context"),
        }
    }
}

/// Built-in operators with exactly one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation. Argument must be `Bool`.
    Not,
    /// Integer negation. Argument must be `Long`.
    Neg,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Not => write!(f, "!"),
            Self::Neg => write!(f, "-"),
        }
    }
}

/// Built-in operators with exactly two arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Equality. Works on arguments of any type, ie "total equality". If
    /// you compare things of different types, `==` will return `false`,
    /// rather than error.
    Eq,
    /// `<`. Arguments must both be `Long`, or both the same orderable
    /// extension type.
    Less,
    /// `<=`. Same typing rules as `Less`.
    LessEq,
    /// `>`. Same typing rules as `Less`.
    Greater,
    /// `>=`. Same typing rules as `Less`.
    GreaterEq,
    /// Integer addition. Arguments must be `Long`.
    Add,
    /// Integer subtraction. Arguments must be `Long`.
    Sub,
    /// Integer multiplication. Arguments must be `Long`.
    Mul,
    /// Hierarchy membership. Left argument must be an entity; right
    /// argument must be an entity or a set of entities.
    In,
    /// Set membership. Left argument must be a set.
    Contains,
    /// `left.containsAll(right)`: both arguments must be sets.
    ContainsAll,
    /// `left.containsAny(right)`: both arguments must be sets.
    ContainsAny,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Less => write!(f, "<"),
            Self::LessEq => write!(f, "<="),
            Self::Greater => write!(f, ">"),
            Self::GreaterEq => write!(f, ">="),
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::In => write!(f, "in"),
            Self::Contains => write!(f, "contains"),
            Self::ContainsAll => write!(f, "containsAll"),
            Self::ContainsAny => write!(f, "containsAny"),
        }
    }
}

/// An expression. Conditions of policies are expressions of type `Bool`.
/// Cloning is O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    kind: ExprKind,
}

/// The possible expression variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// Literal value
    Lit(Literal),
    /// Variable
    Var(Var),
    /// Ternary expression
    If {
        /// Condition for the ternary expression. Must evaluate to Bool type
        test_expr: Arc<Expr>,
        /// Value if true
        then_expr: Arc<Expr>,
        /// Value if false
        else_expr: Arc<Expr>,
    },
    /// Boolean AND. Short-circuiting: if `left` is `false`, `right` is
    /// never evaluated.
    And {
        /// Left operand, which will be eagerly evaluated
        left: Arc<Expr>,
        /// Right operand, which may not be evaluated due to short-circuiting
        right: Arc<Expr>,
    },
    /// Boolean OR. Short-circuiting: if `left` is `true`, `right` is never
    /// evaluated.
    Or {
        /// Left operand, which will be eagerly evaluated
        left: Arc<Expr>,
        /// Right operand, which may not be evaluated due to short-circuiting
        right: Arc<Expr>,
    },
    /// Application of a built-in unary operator
    UnaryApp {
        /// Unary operator to apply
        op: UnaryOp,
        /// Argument to apply the operator to
        arg: Arc<Expr>,
    },
    /// Application of a built-in binary operator
    BinaryApp {
        /// Binary operator to apply
        op: BinaryOp,
        /// First arg
        arg1: Arc<Expr>,
        /// Second arg
        arg2: Arc<Expr>,
    },
    /// Application of an extension function (or method; methods are
    /// function applications with the receiver as the first argument)
    ExtensionFunctionApp {
        /// Name of the function to apply
        fn_name: SmolStr,
        /// Args to apply the function to
        args: Arc<Vec<Expr>>,
    },
    /// Get an attribute of an entity, or a field of a record
    GetAttr {
        /// Expression to get an attribute/field of. Must evaluate to either
        /// Record or Entity type
        expr: Arc<Expr>,
        /// Attribute or field to get
        attr: SmolStr,
    },
    /// Does the given `expr` have the given `attr`?
    HasAttr {
        /// Expression to test. Must evaluate to either Record or Entity type
        expr: Arc<Expr>,
        /// Attribute or field to check for
        attr: SmolStr,
    },
    /// Regex-like string matching similar to IAM's `StringLike` operator
    Like {
        /// Expression to test. Must evaluate to String type
        expr: Arc<Expr>,
        /// Pattern to match on; can include the wildcard `*`, which matches
        /// any string (including the empty string)
        pattern: Pattern,
    },
    /// Entity type test. Does the first argument have the entity type
    /// specified by the second argument?
    Is {
        /// Expression to test. Must evaluate to an entity
        expr: Arc<Expr>,
        /// The [`EntityType`] used for the type membership test
        entity_type: EntityType,
    },
    /// Set literal (whose elements may be arbitrary expressions)
    Set(Arc<Vec<Expr>>),
    /// Anonymous record literal (whose values may be arbitrary expressions)
    Record(Arc<BTreeMap<SmolStr, Expr>>),
}

impl Expr {
    fn new(kind: ExprKind) -> Self {
        Self { kind }
    }

    /// Access the inner `ExprKind`
    pub fn expr_kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Create an `Expr` that's just a single `Literal`
    pub fn val(v: impl Into<Literal>) -> Self {
        Self::new(ExprKind::Lit(v.into()))
    }

    /// Create an `Expr` that's just this literal `Var`
    pub fn var(v: Var) -> Self {
        Self::new(ExprKind::Var(v))
    }

    /// Create a ternary (if-then-else) `Expr`
    pub fn ite(test_expr: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Self::new(ExprKind::If {
            test_expr: Arc::new(test_expr),
            then_expr: Arc::new(then_expr),
            else_expr: Arc::new(else_expr),
        })
    }

    /// Create a 'not' expression
    pub fn not(e: Expr) -> Self {
        Self::new(ExprKind::UnaryApp {
            op: UnaryOp::Not,
            arg: Arc::new(e),
        })
    }

    /// Create a '==' expression
    pub fn is_eq(e1: Expr, e2: Expr) -> Self {
        Self::new(ExprKind::BinaryApp {
            op: BinaryOp::Eq,
            arg1: Arc::new(e1),
            arg2: Arc::new(e2),
        })
    }

    /// Create a '!=' expression, desugared to `!(e1 == e2)`
    pub fn noteq(e1: Expr, e2: Expr) -> Self {
        Self::not(Self::is_eq(e1, e2))
    }

    /// Create an 'and' expression
    pub fn and(e1: Expr, e2: Expr) -> Self {
        Self::new(ExprKind::And {
            left: Arc::new(e1),
            right: Arc::new(e2),
        })
    }

    /// Create an 'or' expression
    pub fn or(e1: Expr, e2: Expr) -> Self {
        Self::new(ExprKind::Or {
            left: Arc::new(e1),
            right: Arc::new(e2),
        })
    }

    /// Create a '<' expression
    pub fn less(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::Less, e1, e2)
    }

    /// Create a '<=' expression
    pub fn lesseq(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::LessEq, e1, e2)
    }

    /// Create a '>' expression
    pub fn greater(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::Greater, e1, e2)
    }

    /// Create a '>=' expression
    pub fn greatereq(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::GreaterEq, e1, e2)
    }

    /// Create an 'add' expression
    pub fn add(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::Add, e1, e2)
    }

    /// Create a 'sub' expression
    pub fn sub(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::Sub, e1, e2)
    }

    /// Create a 'mul' expression
    pub fn mul(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::Mul, e1, e2)
    }

    /// Create a 'neg' expression
    pub fn neg(e: Expr) -> Self {
        Self::new(ExprKind::UnaryApp {
            op: UnaryOp::Neg,
            arg: Arc::new(e),
        })
    }

    /// Create an 'in' expression. First argument must evaluate to an
    /// entity; second argument must evaluate to either an entity or a set
    /// of entities.
    pub fn is_in(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::In, e1, e2)
    }

    /// Create a 'contains' expression
    pub fn contains(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::Contains, e1, e2)
    }

    /// Create a 'containsAll' expression. Arguments must evaluate to Set type
    pub fn contains_all(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::ContainsAll, e1, e2)
    }

    /// Create a 'containsAny' expression. Arguments must evaluate to Set type
    pub fn contains_any(e1: Expr, e2: Expr) -> Self {
        Self::binary_app(BinaryOp::ContainsAny, e1, e2)
    }

    /// Create a set literal expression
    pub fn set(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(ExprKind::Set(Arc::new(exprs.into_iter().collect())))
    }

    /// Create a record literal expression
    pub fn record<K: Into<SmolStr>>(pairs: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Self::new(ExprKind::Record(Arc::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    /// Create an expression calling an extension function or method. For
    /// method-style calls, the receiver is the first element of `args`.
    pub fn call_extension_fn(fn_name: impl Into<SmolStr>, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::ExtensionFunctionApp {
            fn_name: fn_name.into(),
            args: Arc::new(args),
        })
    }

    /// Create an expression calling a method on a receiver expression
    pub fn call_method(receiver: Expr, name: impl Into<SmolStr>, mut args: Vec<Expr>) -> Self {
        args.insert(0, receiver);
        Self::call_extension_fn(name, args)
    }

    /// Create a 'get attribute' expression
    pub fn get_attr(expr: Expr, attr: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::GetAttr {
            expr: Arc::new(expr),
            attr: attr.into(),
        })
    }

    /// Create a 'has attribute' expression
    pub fn has_attr(expr: Expr, attr: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::HasAttr {
            expr: Arc::new(expr),
            attr: attr.into(),
        })
    }

    /// Create a 'like' expression
    pub fn like(expr: Expr, pattern: impl IntoIterator<Item = PatternElem>) -> Self {
        Self::new(ExprKind::Like {
            expr: Arc::new(expr),
            pattern: pattern.into_iter().collect(),
        })
    }

    /// Create an `is` expression
    pub fn is_entity_type(expr: Expr, entity_type: impl Into<EntityType>) -> Self {
        Self::new(ExprKind::Is {
            expr: Arc::new(expr),
            entity_type: entity_type.into(),
        })
    }

    /// Create an `e1 is T in e2` expression, desugared to
    /// `(e1 is T) && (e1 in e2)`
    pub fn is_entity_type_in(e1: Expr, entity_type: impl Into<EntityType>, e2: Expr) -> Self {
        Self::and(
            Self::is_entity_type(e1.clone(), entity_type),
            Self::is_in(e1, e2),
        )
    }

    fn binary_app(op: BinaryOp, e1: Expr, e2: Expr) -> Self {
        Self::new(ExprKind::BinaryApp {
            op,
            arg1: Arc::new(e1),
            arg2: Arc::new(e2),
        })
    }

    /// Whether the given variable occurs anywhere in this expression
    pub fn contains_var(&self, var: Var) -> bool {
        match self.expr_kind() {
            ExprKind::Lit(_) => false,
            ExprKind::Var(v) => *v == var,
            ExprKind::If {
                test_expr,
                then_expr,
                else_expr,
            } => {
                test_expr.contains_var(var)
                    || then_expr.contains_var(var)
                    || else_expr.contains_var(var)
            }
            ExprKind::And { left, right } | ExprKind::Or { left, right } => {
                left.contains_var(var) || right.contains_var(var)
            }
            ExprKind::UnaryApp { arg, .. } => arg.contains_var(var),
            ExprKind::BinaryApp { arg1, arg2, .. } => {
                arg1.contains_var(var) || arg2.contains_var(var)
            }
            ExprKind::ExtensionFunctionApp { args, .. } => {
                args.iter().any(|arg| arg.contains_var(var))
            }
            ExprKind::GetAttr { expr, .. }
            | ExprKind::HasAttr { expr, .. }
            | ExprKind::Like { expr, .. }
            | ExprKind::Is { expr, .. } => expr.contains_var(var),
            ExprKind::Set(items) => items.iter().any(|item| item.contains_var(var)),
            ExprKind::Record(map) => map.values().any(|item| item.contains_var(var)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn noteq_desugars_to_not_eq() {
        let e = Expr::noteq(Expr::val(1), Expr::val(2));
        match e.expr_kind() {
            ExprKind::UnaryApp {
                op: UnaryOp::Not,
                arg,
            } => {
                assert!(matches!(
                    arg.expr_kind(),
                    ExprKind::BinaryApp {
                        op: BinaryOp::Eq,
                        ..
                    }
                ));
            }
            k => panic!("expected not(eq), got {k:?}"),
        }
    }

    #[test]
    fn contains_var_walks_all_nodes() {
        let e = Expr::and(
            Expr::val(true),
            Expr::is_eq(
                Expr::get_attr(Expr::var(Var::Context), "x"),
                Expr::val(42),
            ),
        );
        assert!(e.contains_var(Var::Context));
        assert!(!e.contains_var(Var::Principal));

        let e = Expr::record([("key", Expr::var(Var::Resource))]);
        assert!(e.contains_var(Var::Resource));
        assert!(!e.contains_var(Var::Action));

        let e = Expr::set([Expr::val(1), Expr::var(Var::Action)]);
        assert!(e.contains_var(Var::Action));
    }
}

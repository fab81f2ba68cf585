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

use crate::ast::{BinaryOp, EntityUID, SlotId, Type, UnaryOp, Value};
use nonempty::NonEmpty;
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;

/// An error generated while evaluating an expression
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub struct EvaluationError {
    /// The kind of error that occurred
    error_kind: EvaluationErrorKind,
    /// Optional advice on how to fix the error
    advice: Option<String>,
}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.advice {
            Some(advice) => write!(f, "{}. {}", self.error_kind, advice),
            None => self.error_kind.fmt(f),
        }
    }
}

impl EvaluationError {
    /// Extract the kind of issue detected during evaluation
    pub fn error_kind(&self) -> &EvaluationErrorKind {
        &self.error_kind
    }

    /// Extract the advice attached to the error, if any
    pub fn advice(&self) -> Option<&str> {
        self.advice.as_deref()
    }

    /// Construct a [`EvaluationErrorKind::EntityDoesNotExist`] error
    pub(crate) fn entity_does_not_exist(euid: Arc<EntityUID>) -> Self {
        Self {
            error_kind: EvaluationErrorKind::EntityDoesNotExist(euid),
            advice: None,
        }
    }

    /// Construct a [`EvaluationErrorKind::EntityAttrDoesNotExist`] error
    pub(crate) fn entity_attr_does_not_exist(entity: Arc<EntityUID>, attr: SmolStr) -> Self {
        Self {
            error_kind: EvaluationErrorKind::EntityAttrDoesNotExist { entity, attr },
            advice: None,
        }
    }

    /// Construct a [`EvaluationErrorKind::RecordAttrDoesNotExist`] error
    pub(crate) fn record_attr_does_not_exist(attr: SmolStr) -> Self {
        Self {
            error_kind: EvaluationErrorKind::RecordAttrDoesNotExist(attr),
            advice: None,
        }
    }

    /// Construct a [`EvaluationErrorKind::TypeError`] error
    pub(crate) fn type_error(expected: NonEmpty<Type>, actual: Type) -> Self {
        Self {
            error_kind: EvaluationErrorKind::TypeError { expected, actual },
            advice: None,
        }
    }

    /// Construct a [`EvaluationErrorKind::TypeError`] error with the advice
    /// field set
    pub(crate) fn type_error_with_advice(
        expected: NonEmpty<Type>,
        actual: Type,
        advice: String,
    ) -> Self {
        Self {
            error_kind: EvaluationErrorKind::TypeError { expected, actual },
            advice: Some(advice),
        }
    }

    /// Construct a [`EvaluationErrorKind::WrongNumArguments`] error
    pub(crate) fn wrong_num_arguments(
        function_name: SmolStr,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self {
            error_kind: EvaluationErrorKind::WrongNumArguments {
                function_name,
                expected,
                actual,
            },
            advice: None,
        }
    }

    /// Construct a [`EvaluationErrorKind::UnlinkedSlot`] error
    pub(crate) fn unlinked_slot(id: SlotId) -> Self {
        Self {
            error_kind: EvaluationErrorKind::UnlinkedSlot(id),
            advice: None,
        }
    }

    /// Construct a [`EvaluationErrorKind::FailedExtensionFunctionApplication`]
    /// error
    pub(crate) fn failed_extension_function_application(
        extension_name: SmolStr,
        msg: String,
    ) -> Self {
        Self {
            error_kind: EvaluationErrorKind::FailedExtensionFunctionApplication {
                extension_name,
                msg,
            },
            advice: None,
        }
    }
}

impl From<crate::extensions::ExtensionFunctionLookupError> for EvaluationError {
    fn from(err: crate::extensions::ExtensionFunctionLookupError) -> Self {
        Self {
            error_kind: err.into(),
            advice: None,
        }
    }
}

impl From<IntegerOverflowError> for EvaluationError {
    fn from(err: IntegerOverflowError) -> Self {
        Self {
            error_kind: err.into(),
            advice: None,
        }
    }
}

/// Enumeration of the possible errors that can occur during evaluation
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum EvaluationErrorKind {
    /// Tried to lookup this entity UID, but it didn't exist in the provided
    /// entities
    #[error("entity does not exist: {0}")]
    EntityDoesNotExist(Arc<EntityUID>),

    /// Tried to get this attribute, but the specified entity didn't have
    /// that attribute
    #[error("`{entity}` does not have the attribute: {attr}")]
    EntityAttrDoesNotExist {
        /// Entity that didn't have the attribute
        entity: Arc<EntityUID>,
        /// Name of the attribute it didn't have
        attr: SmolStr,
    },

    /// Tried to get an attribute of a (non-entity) record, but that record
    /// didn't have that attribute
    #[error("record does not have the attribute: {0}")]
    RecordAttrDoesNotExist(SmolStr),

    /// An error occurred when looking up an extension function
    #[error(transparent)]
    FailedExtensionFunctionLookup(#[from] crate::extensions::ExtensionFunctionLookupError),

    /// Tried to evaluate an operation on values with incorrect types for
    /// that operation
    #[error("{}", pretty_type_error(expected, actual))]
    TypeError {
        /// Expected (one of) these types
        expected: NonEmpty<Type>,
        /// Encountered this type instead
        actual: Type,
    },

    /// Wrong number of arguments provided to an extension function
    #[error("wrong number of arguments provided to extension function {function_name}: expected {expected}, got {actual}")]
    WrongNumArguments {
        /// the function that was called
        function_name: SmolStr,
        /// expected number of arguments
        expected: usize,
        /// actual number of arguments
        actual: usize,
    },

    /// Overflow during an integer operation
    #[error(transparent)]
    IntegerOverflow(#[from] IntegerOverflowError),

    /// Thrown when a policy is evaluated with a slot that is not linked to
    /// an [`EntityUID`]
    #[error("template slot `{0}` was not linked")]
    UnlinkedSlot(SlotId),

    /// Evaluation error thrown by an extension function
    #[error("error while evaluating {extension_name} extension function: {msg}")]
    FailedExtensionFunctionApplication {
        /// Name of the extension throwing the error
        extension_name: SmolStr,
        /// Error message from the extension
        msg: String,
    },
}

/// helper function for pretty-printing type errors
fn pretty_type_error(expected: &NonEmpty<Type>, actual: &Type) -> String {
    if expected.len() == 1 {
        format!("type error: expected {}, got {}", expected.first(), actual)
    } else {
        use itertools::Itertools;
        format!(
            "type error: expected one of [{}], got {actual}",
            expected.iter().join(", ")
        )
    }
}

/// Errors raised when integer arithmetic overflows
#[derive(Debug, PartialEq, Eq, Clone, Error)]
pub enum IntegerOverflowError {
    /// Overflow during a binary operation
    #[error("integer overflow while attempting to {} the values `{arg1}` and `{arg2}`", match .op { BinaryOp::Add => "add", BinaryOp::Sub => "subtract", BinaryOp::Mul => "multiply", _ => "perform an operation on" })]
    BinaryOp {
        /// overflow while evaluating this operator
        op: BinaryOp,
        /// first argument to that operator
        arg1: Value,
        /// second argument to that operator
        arg2: Value,
    },

    /// Overflow during a unary operation
    #[error("integer overflow while attempting to {} the value `{arg}`", match .op { UnaryOp::Neg => "negate", _ => "perform an operation on" })]
    UnaryOp {
        /// overflow while evaluating this operator
        op: UnaryOp,
        /// argument to that operator
        arg: Value,
    },
}

/// Type alias for convenience
pub type Result<T> = std::result::Result<T, EvaluationError>;

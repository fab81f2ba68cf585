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

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// One of the four parts of a batch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    /// the principal part
    Principal,
    /// the action part
    Action,
    /// the resource part
    Resource,
    /// the context part
    Context,
}

impl std::fmt::Display for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Principal => write!(f, "principal"),
            Self::Action => write!(f, "action"),
            Self::Resource => write!(f, "resource"),
            Self::Context => write!(f, "context"),
        }
    }
}

/// Errors that abort a batch authorization call. Unlike per-policy
/// evaluation errors (which only mark the offending policy inapplicable),
/// these stop the batch and are returned directly.
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic, Error)]
pub enum BatchError {
    /// A `Variable` placeholder in the request has no binding list
    #[error("unbound variable `{0}`")]
    UnboundVariable(SmolStr),

    /// A binding list was supplied for a variable the request never
    /// references
    #[error("unused variable `{0}`")]
    UnusedVariable(SmolStr),

    /// A required request part was not supplied
    #[error("missing request part: {0}")]
    MissingPart(Part),

    /// A request part was neither a suitable concrete value, a `Variable`,
    /// nor `Ignore` (after substitution, principal/action/resource must be
    /// entities and context must be a record)
    #[error("invalid request part: {0}")]
    InvalidPart(Part),

    /// The cancellation token was triggered
    #[error("batch authorization cancelled")]
    Cancelled,
}

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

use smol_str::SmolStr;

/// Types of values in the engine, as reported in type errors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    /// Boolean type
    Bool,
    /// Signed-integer type
    Long,
    /// String type
    String,
    /// Set type
    Set,
    /// Record type
    Record,
    /// Entity type (reported uniformly; the concrete entity type of a value
    /// is carried on the value itself)
    Entity,
    /// Extension type, distinguished by the extension type name
    /// (e.g. `decimal`, `ipaddr`)
    Extension {
        /// Name of the extension type
        name: SmolStr,
    },
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Long => write!(f, "long"),
            Self::String => write!(f, "string"),
            Self::Set => write!(f, "set"),
            Self::Record => write!(f, "record"),
            Self::Entity => write!(f, "(entity of some type)"),
            Self::Extension { name } => write!(f, "{name}"),
        }
    }
}

/// Trait for everything in the engine that has a statically-known type.
pub trait StaticallyTyped {
    /// Get the object's type
    fn type_of(&self) -> Type;
}

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

use crate::ast::Value;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The type component of an [`EntityUID`]. Plain string; equality and
/// hashing are string equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityType(SmolStr);

impl EntityType {
    /// Get the type name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Into<SmolStr>> From<S> for EntityType {
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an entity: the pair of its type and its
/// entity-id. Displayed as `Type::"id"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityUID {
    /// Type of the entity
    ty: EntityType,
    /// Entity-id of the entity
    eid: SmolStr,
}

impl EntityUID {
    /// Create a new `EntityUID` from a type name and an entity-id
    pub fn new(ty: impl Into<EntityType>, eid: impl Into<SmolStr>) -> Self {
        Self {
            ty: ty.into(),
            eid: eid.into(),
        }
    }

    /// Get the type component
    pub fn entity_type(&self) -> &EntityType {
        &self.ty
    }

    /// Get the entity-id component
    pub fn eid(&self) -> &SmolStr {
        &self.eid
    }
}

impl std::fmt::Display for EntityUID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::\"{}\"", self.ty, self.eid.escape_debug())
    }
}

/// An entity: its UID, its attributes, and the UIDs of its parents in the
/// entity hierarchy. `in` queries walk `parents` transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    uid: EntityUID,
    /// Attribute values keyed on attribute name. Cloning is O(1).
    attrs: Arc<BTreeMap<SmolStr, Value>>,
    /// UIDs of this entity's direct parents
    parents: Arc<BTreeSet<EntityUID>>,
}

impl Entity {
    /// Create an entity with the given UID, attributes, and parents
    pub fn new(
        uid: EntityUID,
        attrs: impl IntoIterator<Item = (SmolStr, Value)>,
        parents: impl IntoIterator<Item = EntityUID>,
    ) -> Self {
        Self {
            uid,
            attrs: Arc::new(attrs.into_iter().collect()),
            parents: Arc::new(parents.into_iter().collect()),
        }
    }

    /// Create an entity with the given UID and no attributes or parents
    pub fn with_uid(uid: EntityUID) -> Self {
        Self {
            uid,
            attrs: Arc::new(BTreeMap::new()),
            parents: Arc::new(BTreeSet::new()),
        }
    }

    /// Get the UID of this entity
    pub fn uid(&self) -> &EntityUID {
        &self.uid
    }

    /// Get the value of the given attribute, or `None` if not present
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attrs.get(attr)
    }

    /// Iterate over this entity's attributes
    pub fn attrs(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.attrs.iter()
    }

    /// Iterate over the UIDs of this entity's direct parents
    pub fn parents(&self) -> impl Iterator<Item = &EntityUID> {
        self.parents.iter()
    }

    /// Whether `uid` is a direct parent of this entity
    pub fn is_child_of(&self, uid: &EntityUID) -> bool {
        self.parents.contains(uid)
    }
}

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

//! This module contains the entity store used to resolve entity references
//! during evaluation.

use crate::ast::{Entity, EntityType, EntityUID};
use std::collections::{HashMap, HashSet, VecDeque};

/// All entities available during evaluation, keyed on UID.
///
/// Immutable during evaluation; construct a fresh store to change the
/// entity data.
#[derive(Debug, Clone, Default)]
pub struct Entities {
    /// important internal invariant: for any `Entities` object that exists,
    /// the `uid` of the `Entity` in this map is the key it is stored under
    entities: HashMap<EntityUID, Entity>,
}

/// The result of looking up an entity by UID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dereference<'a> {
    /// The entity is not present in the store
    NoSuchEntity,
    /// The entity was found
    Data(&'a Entity),
}

impl Entities {
    /// Create a fresh `Entities` with no entities
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an `Entities` from a collection of `Entity` objects. A later
    /// entity with the same UID as an earlier one replaces it.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|e| (e.uid().clone(), e))
                .collect(),
        }
    }

    /// Look up the entity with the given UID
    pub fn entity(&self, uid: &EntityUID) -> Dereference<'_> {
        match self.entities.get(uid) {
            Some(e) => Dereference::Data(e),
            None => Dereference::NoSuchEntity,
        }
    }

    /// Whether `child in ancestor` holds: true iff `child == ancestor`, or
    /// `ancestor` appears in the transitive closure of `child`'s parents.
    ///
    /// Breadth-first traversal with a visited set, so cyclic parent graphs
    /// terminate. An entity absent from the store has no parents.
    pub fn in_hierarchy(&self, child: &EntityUID, ancestor: &EntityUID) -> bool {
        if child == ancestor {
            return true;
        }
        let mut visited: HashSet<&EntityUID> = HashSet::new();
        let mut queue: VecDeque<&EntityUID> = VecDeque::new();
        if let Dereference::Data(e) = self.entity(child) {
            queue.extend(e.parents());
        }
        while let Some(uid) = queue.pop_front() {
            if !visited.insert(uid) {
                continue;
            }
            if uid == ancestor {
                return true;
            }
            if let Dereference::Data(e) = self.entity(uid) {
                queue.extend(e.parents());
            }
        }
        false
    }

    /// Whether the entity with the given UID has the given type. Purely a
    /// UID test; the entity need not be present in the store.
    pub fn is_of_type(uid: &EntityUID, ty: &EntityType) -> bool {
        uid.entity_type() == ty
    }

    /// Iterate over all entities in the store, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities in the store
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<Entity> for Entities {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        Self::from_entities(iter)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn uid(ty: &str, id: &str) -> EntityUID {
        EntityUID::new(ty, id)
    }

    fn store(edges: &[(&str, &str)]) -> Entities {
        // edges are (child id, parent id), all of type "E"
        let mut parents: HashMap<EntityUID, Vec<EntityUID>> = HashMap::new();
        for (c, p) in edges {
            parents
                .entry(uid("E", c))
                .or_default()
                .push(uid("E", p));
            parents.entry(uid("E", p)).or_default();
        }
        Entities::from_entities(
            parents
                .into_iter()
                .map(|(child, ps)| Entity::new(child, [], ps)),
        )
    }

    #[test]
    fn in_hierarchy_reflexive() {
        let es = Entities::new();
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "a")));
        assert!(!es.in_hierarchy(&uid("E", "a"), &uid("E", "b")));
    }

    #[test]
    fn in_hierarchy_transitive() {
        let es = store(&[("a", "b"), ("b", "c"), ("c", "d")]);
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "b")));
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "c")));
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "d")));
        assert!(!es.in_hierarchy(&uid("E", "d"), &uid("E", "a")));
        assert!(!es.in_hierarchy(&uid("E", "b"), &uid("E", "a")));
    }

    #[test]
    fn in_hierarchy_diamond() {
        let es = store(&[("a", "l"), ("a", "r"), ("l", "top"), ("r", "top")]);
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "top")));
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "l")));
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "r")));
    }

    #[test]
    fn in_hierarchy_cycle_terminates() {
        let es = store(&[("a", "b"), ("b", "a")]);
        assert!(es.in_hierarchy(&uid("E", "a"), &uid("E", "b")));
        assert!(es.in_hierarchy(&uid("E", "b"), &uid("E", "a")));
        assert!(!es.in_hierarchy(&uid("E", "a"), &uid("E", "c")));
    }

    #[test]
    fn missing_entities_have_no_parents() {
        let es = store(&[("a", "b")]);
        assert!(!es.in_hierarchy(&uid("E", "zzz"), &uid("E", "b")));
    }

    #[test]
    fn is_of_type() {
        assert!(Entities::is_of_type(&uid("User", "alice"), &"User".into()));
        assert!(!Entities::is_of_type(&uid("User", "alice"), &"Group".into()));
    }
}

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

use crate::ast::{EntityUID, Value};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Represents the request tuple <P, A, R, C> (see the Cedar design doc).
/// Immutable once constructed; cloning is O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Principal associated with the request
    principal: Arc<EntityUID>,
    /// Action associated with the request
    action: Arc<EntityUID>,
    /// Resource associated with the request
    resource: Arc<EntityUID>,
    /// Context associated with the request
    context: Context,
}

impl Request {
    /// Default constructor
    pub fn new(
        principal: EntityUID,
        action: EntityUID,
        resource: EntityUID,
        context: Context,
    ) -> Self {
        Self {
            principal: Arc::new(principal),
            action: Arc::new(action),
            resource: Arc::new(resource),
            context,
        }
    }

    /// Get the principal associated with the request
    pub fn principal(&self) -> &Arc<EntityUID> {
        &self.principal
    }

    /// Get the action associated with the request
    pub fn action(&self) -> &Arc<EntityUID> {
        &self.action
    }

    /// Get the resource associated with the request
    pub fn resource(&self) -> &Arc<EntityUID> {
        &self.resource
    }

    /// Get the context of the request
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "request with principal {}, action {}, resource {}",
            self.principal, self.action, self.resource
        )
    }
}

/// The context of a request: a record of attribute values. Cloning is O(1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    record: Arc<BTreeMap<SmolStr, Value>>,
}

impl Context {
    /// Create an empty `Context`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a `Context` from (key, value) pairs. Later duplicate keys win.
    pub fn from_pairs<K: Into<SmolStr>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            record: Arc::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// View the context as a record `Value`
    pub fn as_value(&self) -> Value {
        Value::Record(Arc::clone(&self.record))
    }

    /// Iterate over the (key, value) pairs of the context
    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.record.iter()
    }
}

impl From<BTreeMap<SmolStr, Value>> for Context {
    fn from(record: BTreeMap<SmolStr, Value>) -> Self {
        Self {
            record: Arc::new(record),
        }
    }
}

impl From<Arc<BTreeMap<SmolStr, Value>>> for Context {
    fn from(record: Arc<BTreeMap<SmolStr, Value>>) -> Self {
        Self { record }
    }
}

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

//! This module contains all of the standard Cedar extensions.

pub mod datetime;
pub mod decimal;
pub mod ipaddr;

use crate::ast::{StaticallyTyped, Type, Value};
use crate::evaluator::{self, EvaluationError};
use miette::Diagnostic;
use smol_str::SmolStr;
use std::collections::HashMap;
use thiserror::Error;

pub use datetime::{Datetime, Duration};
pub use decimal::Decimal;
pub use ipaddr::IPAddr;

/// A value of one of the extension types. The variants form a closed set;
/// dispatch is an exhaustive match, and all errors are synchronous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtensionValue {
    /// A `decimal` value: fixed-point with four fractional digits
    Decimal(Decimal),
    /// An `ipaddr` value: IPv4 or IPv6 address or range
    Ip(IPAddr),
    /// A `datetime` value: UTC milliseconds since the Unix epoch
    Datetime(Datetime),
    /// A `duration` value: signed milliseconds
    Duration(Duration),
}

impl ExtensionValue {
    /// The extension type name of this value (e.g. `decimal`)
    pub fn typename(&self) -> SmolStr {
        match self {
            Self::Decimal(_) => "decimal".into(),
            Self::Ip(_) => "ipaddr".into(),
            Self::Datetime(_) => "datetime".into(),
            Self::Duration(_) => "duration".into(),
        }
    }
}

impl StaticallyTyped for ExtensionValue {
    fn type_of(&self) -> Type {
        Type::Extension {
            name: self.typename(),
        }
    }
}

impl std::fmt::Display for ExtensionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decimal(d) => write!(f, "decimal(\"{d}\")"),
            Self::Ip(ip) => write!(f, "ip(\"{ip}\")"),
            Self::Datetime(dt) => write!(f, "datetime(\"{dt}\")"),
            Self::Duration(d) => write!(f, "duration(\"{d}\")"),
        }
    }
}

/// Which "style" is a function call
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CallStyle {
    /// Function-style, eg foo(a, b)
    FunctionStyle,
    /// Method-style, eg a.foo(b)
    MethodStyle,
}

/// Trait object that implements the extension function call.
pub type ExtensionFunctionObject =
    Box<dyn Fn(&[Value]) -> evaluator::Result<Value> + Sync + Send + 'static>;

/// Extension function. These can be called by the given `name` in Cedar
/// expressions.
pub struct ExtensionFunction {
    /// Name of the function
    name: SmolStr,
    /// Which `CallStyle` should be used when calling this function
    style: CallStyle,
    /// The actual function, which takes an `&[Value]` and returns a
    /// `Value`, or an evaluation error
    func: ExtensionFunctionObject,
}

impl ExtensionFunction {
    fn new(name: SmolStr, style: CallStyle, func: ExtensionFunctionObject) -> Self {
        Self { name, style, func }
    }

    /// Create a new `ExtensionFunction` taking one argument
    pub fn unary(
        name: impl Into<SmolStr>,
        style: CallStyle,
        func: Box<dyn Fn(&Value) -> evaluator::Result<Value> + Sync + Send + 'static>,
    ) -> Self {
        let name = name.into();
        Self::new(name.clone(), style, {
            Box::new(move |args: &[Value]| match args {
                [arg] => func(arg),
                _ => Err(EvaluationError::wrong_num_arguments(
                    name.clone(),
                    1,
                    args.len(),
                )),
            })
        })
    }

    /// Create a new `ExtensionFunction` taking two arguments
    pub fn binary(
        name: impl Into<SmolStr>,
        style: CallStyle,
        func: Box<dyn Fn(&Value, &Value) -> evaluator::Result<Value> + Sync + Send + 'static>,
    ) -> Self {
        let name = name.into();
        Self::new(name.clone(), style, {
            Box::new(move |args: &[Value]| match args {
                [first, second] => func(first, second),
                _ => Err(EvaluationError::wrong_num_arguments(
                    name.clone(),
                    2,
                    args.len(),
                )),
            })
        })
    }

    /// Get the name of the function
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Get the call style of the function
    pub fn style(&self) -> CallStyle {
        self.style
    }

    /// Call the function with the given args
    pub fn call(&self, args: &[Value]) -> evaluator::Result<Value> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for ExtensionFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<extension function {}>", self.name)
    }
}

/// A Cedar extension: a named group of extension functions.
pub struct Extension {
    /// Name of the extension
    name: SmolStr,
    /// Extension functions. These are legal to call in Cedar expressions.
    functions: HashMap<SmolStr, ExtensionFunction>,
}

impl Extension {
    /// Create a new `Extension` with the given name and extension functions
    pub fn new(
        name: impl Into<SmolStr>,
        functions: impl IntoIterator<Item = ExtensionFunction>,
    ) -> Self {
        Self {
            name: name.into(),
            functions: functions
                .into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
        }
    }

    /// Get the name of the extension
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    /// Look up a function by name, or return `None` if the extension
    /// doesn't provide a function with that name
    pub fn get_func(&self, name: &str) -> Option<&ExtensionFunction> {
        self.functions.get(name)
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<extension {}>", self.name())
    }
}

lazy_static::lazy_static! {
    static ref ALL_AVAILABLE_EXTENSIONS: Vec<Extension> = vec![
        decimal::extension(),
        ipaddr::extension(),
        datetime::extension(),
    ];
}

/// Holds data on all the Extensions which are active for a given
/// evaluation.
///
/// Clone is cheap for this type.
#[derive(Debug, Clone, Copy)]
pub struct Extensions<'a> {
    /// the actual extensions
    extensions: &'a [Extension],
}

impl Extensions<'static> {
    /// Get a new `Extensions` containing data on all the available
    /// extensions.
    pub fn all_available() -> Extensions<'static> {
        Extensions {
            extensions: &ALL_AVAILABLE_EXTENSIONS,
        }
    }

    /// Get a new `Extensions` with no extensions enabled.
    pub fn none() -> Extensions<'static> {
        Extensions { extensions: &[] }
    }
}

impl<'a> Extensions<'a> {
    /// Get a new `Extensions` with these specific extensions enabled.
    pub fn specific_extensions(extensions: &'a [Extension]) -> Extensions<'a> {
        Extensions { extensions }
    }

    /// Get the names of all active extensions.
    pub fn ext_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.extensions.iter().map(|ext| ext.name())
    }

    /// Get the extension function with the given name, from these
    /// extensions. Returns an error if the function is not defined by any
    /// extension.
    pub fn func(&self, name: &str) -> Result<&ExtensionFunction, ExtensionFunctionLookupError> {
        self.extensions
            .iter()
            .find_map(|ext| ext.get_func(name))
            .ok_or_else(|| ExtensionFunctionLookupError::FuncDoesNotExist { name: name.into() })
    }
}

/// Errors thrown when looking up an extension function
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic, Error)]
pub enum ExtensionFunctionLookupError {
    /// The function was not defined by any active extension
    #[error("extension function `{name}` does not exist")]
    FuncDoesNotExist {
        /// the name we failed to find
        name: SmolStr,
    },
}

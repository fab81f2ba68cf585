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

//! This module contains the Cedar 'decimal' extension.

use crate::ast::{Literal, Type, Value};
use crate::evaluator::{self, EvaluationError};
use crate::extensions::{CallStyle, Extension, ExtensionFunction, ExtensionValue};
use miette::Diagnostic;
use nonempty::nonempty;
use thiserror::Error;

/// Fractional digits a decimal carries
const SCALE: u32 = 4;
/// Scale factor between whole numbers and stored units (`10 ^ SCALE`)
const UNITS_PER_WHOLE: i128 = 10_000;

/// Decimal value with a fixed scale of [`SCALE`] fractional digits, stored
/// as a signed 64-bit count of `1/10^SCALE`ths.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Decimal {
    value: i64,
}

/// Help message to display when a String was provided where a decimal value
/// was expected.
const ADVICE_MSG: &str = "strings are not decimals; wrap the literal in the `decimal` constructor";

/// Potential errors when working with decimal values. Note that these are
/// converted to evaluation errors (which take a string argument) before
/// being reported to users.
#[derive(Debug, Diagnostic, Error)]
enum Error {
    /// The input string does not have the `digits.digits` shape
    #[error("string `{0}` does not represent a decimal number")]
    InvalidLiteral(String),

    /// More fractional digits than the fixed scale can hold
    #[error("decimal `{0}` has more than {SCALE} fractional digits")]
    #[diagnostic(help("decimals carry exactly {SCALE} fractional digits; drop the extra ones"))]
    PrecisionLoss(String),

    /// The scaled value does not fit in the 64-bit representation
    #[error("decimal value is out of range")]
    OutOfRange,
}

impl Decimal {
    /// Convert a string into a `Decimal` value.
    ///
    /// The accepted shape is an optional `-`, one or more digits, a `.`,
    /// and one to [`SCALE`] more digits. The two digit runs are combined in
    /// 128-bit arithmetic and only narrowed to the 64-bit representation at
    /// the end, so the sign applies uniformly (including `-0.5`) and
    /// anything unrepresentable is caught by the final narrowing.
    fn parse(text: &str) -> Result<Self, Error> {
        let (whole_part, frac_part) = text
            .split_once('.')
            .ok_or_else(|| Error::InvalidLiteral(text.to_owned()))?;
        let (negative, whole_digits) = match whole_part.strip_prefix('-') {
            Some(tail) => (true, tail),
            None => (false, whole_part),
        };
        let all_digits =
            |run: &str| !run.is_empty() && run.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole_digits) || !all_digits(frac_part) {
            return Err(Error::InvalidLiteral(text.to_owned()));
        }
        let frac_width = u32::try_from(frac_part.len())
            .map_err(|_| Error::PrecisionLoss(text.to_owned()))?;
        if frac_width > SCALE {
            return Err(Error::PrecisionLoss(text.to_owned()));
        }

        let whole: i128 = whole_digits.parse().map_err(|_| Error::OutOfRange)?;
        // scale the fractional run up as if it had been written with all
        // SCALE digits
        let frac: i128 = frac_part.parse().map_err(|_| Error::OutOfRange)?;
        let frac = frac * i128::from(10_i64.pow(SCALE - frac_width));

        let mut units = whole
            .checked_mul(UNITS_PER_WHOLE)
            .and_then(|w| w.checked_add(frac))
            .ok_or(Error::OutOfRange)?;
        if negative {
            units = -units;
        }
        i64::try_from(units)
            .map(|value| Self { value })
            .map_err(|_| Error::OutOfRange)
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // widen before taking the absolute value so i64::MIN does not wrap
        let v = i128::from(self.value);
        let sign = if v < 0 { "-" } else { "" };
        let whole = v.abs() / UNITS_PER_WHOLE;
        let frac = v.abs() % UNITS_PER_WHOLE;
        let mut frac = format!("{frac:04}");
        while frac.len() > 1 && frac.ends_with('0') {
            frac.pop();
        }
        write!(f, "{sign}{whole}.{frac}")
    }
}

const EXTENSION_NAME: &str = "decimal";

fn extension_err(msg: impl Into<String>) -> EvaluationError {
    EvaluationError::failed_extension_function_application(EXTENSION_NAME.into(), msg.into())
}

/// Cedar function that constructs a `decimal` Cedar type from a Cedar
/// string
fn decimal_from_str(arg: &Value) -> evaluator::Result<Value> {
    let str = arg.get_as_string()?;
    let decimal = Decimal::parse(str.as_str()).map_err(|e| extension_err(e.to_string()))?;
    Ok(Value::Ext(ExtensionValue::Decimal(decimal)))
}

/// Check that `v` is a decimal type and, if it is, return the wrapped value
fn as_decimal(v: &Value) -> Result<&Decimal, EvaluationError> {
    match v {
        Value::Ext(ExtensionValue::Decimal(d)) => Ok(d),
        Value::Lit(Literal::String(_)) => Err(EvaluationError::type_error_with_advice(
            nonempty![Type::Extension {
                name: EXTENSION_NAME.into(),
            }],
            Type::String,
            ADVICE_MSG.into(),
        )),
        _ => Err(EvaluationError::type_error(
            nonempty![Type::Extension {
                name: EXTENSION_NAME.into(),
            }],
            crate::ast::StaticallyTyped::type_of(v),
        )),
    }
}

/// Cedar function that tests whether the first `decimal` Cedar type is
/// less than the second `decimal` Cedar type, returning a Cedar bool
fn decimal_lt(left: &Value, right: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_decimal(left)? < as_decimal(right)?))
}

/// Cedar function that tests whether the first `decimal` Cedar type is
/// less than or equal to the second `decimal` Cedar type, returning a
/// Cedar bool
fn decimal_le(left: &Value, right: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_decimal(left)? <= as_decimal(right)?))
}

/// Cedar function that tests whether the first `decimal` Cedar type is
/// greater than the second `decimal` Cedar type, returning a Cedar bool
fn decimal_gt(left: &Value, right: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_decimal(left)? > as_decimal(right)?))
}

/// Cedar function that tests whether the first `decimal` Cedar type is
/// greater than or equal to the second `decimal` Cedar type, returning a
/// Cedar bool
fn decimal_ge(left: &Value, right: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_decimal(left)? >= as_decimal(right)?))
}

/// Construct the extension
pub fn extension() -> Extension {
    Extension::new(
        EXTENSION_NAME,
        vec![
            ExtensionFunction::unary(
                EXTENSION_NAME,
                CallStyle::FunctionStyle,
                Box::new(decimal_from_str),
            ),
            ExtensionFunction::binary("lessThan", CallStyle::MethodStyle, Box::new(decimal_lt)),
            ExtensionFunction::binary(
                "lessThanOrEqual",
                CallStyle::MethodStyle,
                Box::new(decimal_le),
            ),
            ExtensionFunction::binary("greaterThan", CallStyle::MethodStyle, Box::new(decimal_gt)),
            ExtensionFunction::binary(
                "greaterThanOrEqual",
                CallStyle::MethodStyle,
                Box::new(decimal_ge),
            ),
        ],
    )
}

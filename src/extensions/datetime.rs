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

//! This module contains the Cedar 'datetime' extension, which provides the
//! `datetime` and `duration` extension types.

use crate::ast::{Literal, StaticallyTyped, Type, Value};
use crate::evaluator::{self, EvaluationError};
use crate::extensions::{CallStyle, Extension, ExtensionFunction, ExtensionValue};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use nonempty::nonempty;

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = MS_PER_SECOND * 60;
const MS_PER_HOUR: i64 = MS_PER_MINUTE * 60;
const MS_PER_DAY: i64 = MS_PER_HOUR * 24;

/// A point in time, represented internally as UTC milliseconds since the
/// Unix epoch.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct Datetime {
    epoch: i64,
}

impl From<NaiveDateTime> for Datetime {
    fn from(value: NaiveDateTime) -> Self {
        let delta = value - NaiveDateTime::UNIX_EPOCH;
        Self {
            epoch: delta.num_milliseconds(),
        }
    }
}

impl Datetime {
    /// Truncate to the start of the containing UTC day. Errors (with
    /// `None`) if the result is not representable.
    fn to_date(&self) -> Option<Datetime> {
        self.epoch
            .div_euclid(MS_PER_DAY)
            .checked_mul(MS_PER_DAY)
            .map(|epoch| Datetime { epoch })
    }

    /// The offset within the containing UTC day. Always non-negative.
    fn to_time(&self) -> Duration {
        Duration {
            ms: self.epoch.rem_euclid(MS_PER_DAY),
        }
    }

    /// Shift by the given duration. `None` on overflow.
    fn offset(&self, d: &Duration) -> Option<Datetime> {
        self.epoch.checked_add(d.ms).map(|epoch| Datetime { epoch })
    }

    /// The duration from `other` to `self`. `None` on overflow.
    fn duration_since(&self, other: &Datetime) -> Option<Duration> {
        self.epoch.checked_sub(other.epoch).map(|ms| Duration { ms })
    }
}

impl std::fmt::Display for Datetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.epoch) {
            Some(dt) => {
                let (date, time) = (dt.date_naive(), dt.time());
                write!(
                    f,
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
                    date.year(),
                    date.month(),
                    date.day(),
                    time.hour(),
                    time.minute(),
                    time.second(),
                    time.nanosecond() / 1_000_000,
                )
            }
            None => write!(f, "<datetime {}ms>", self.epoch),
        }
    }
}

/// A span of time, represented internally as signed milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    ms: i64,
}

impl Duration {
    fn to_milliseconds(&self) -> i64 {
        self.ms
    }

    // the quotients below truncate toward zero
    fn to_seconds(&self) -> i64 {
        self.ms / MS_PER_SECOND
    }

    fn to_minutes(&self) -> i64 {
        self.ms / MS_PER_MINUTE
    }

    fn to_hours(&self) -> i64 {
        self.ms / MS_PER_HOUR
    }

    fn to_days(&self) -> i64 {
        self.ms / MS_PER_DAY
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // widen before taking the absolute value so i64::MIN does not wrap
        let mut ms = i128::from(self.ms);
        if ms == 0 {
            return write!(f, "0ms");
        }
        if ms < 0 {
            write!(f, "-")?;
            ms = -ms;
        }
        let units = [
            (i128::from(MS_PER_DAY), "d"),
            (i128::from(MS_PER_HOUR), "h"),
            (i128::from(MS_PER_MINUTE), "m"),
            (i128::from(MS_PER_SECOND), "s"),
            (1, "ms"),
        ];
        for (per, unit) in units {
            let n = ms / per;
            ms %= per;
            if n != 0 {
                write!(f, "{n}{unit}")?;
            }
        }
        Ok(())
    }
}

// PANIC SAFETY This is a valid `Regex`
#[allow(clippy::unwrap_used)]
mod constants {
    use regex::Regex;

    lazy_static::lazy_static! {
        /// `YYYY-MM-DD`, optionally followed by `Thh:mm:ss`, an optional
        /// `.sss`, and a mandatory zone (`Z`, `+hh:mm`/`-hh:mm`, or
        /// `+hhmm`/`-hhmm`)
        pub static ref DATETIME_REGEX: Regex = Regex::new(
            r"^(?P<y>\d{4})-(?P<mo>\d{2})-(?P<d>\d{2})(?:T(?P<h>\d{2}):(?P<mi>\d{2}):(?P<s>\d{2})(?:\.(?P<ms>\d{3}))?(?P<zone>Z|[+-]\d{2}:?\d{2}))?$"
        )
        .unwrap();
    }
}

/// Parse an ISO-8601 datetime of one of the accepted shapes: `YYYY-MM-DD`
/// (midnight UTC), or `YYYY-MM-DDThh:mm:ss[.sss]` followed by `Z` or a
/// `±hh:mm` / `±hhmm` zone offset. A positive offset denotes local time
/// ahead of UTC, so it is subtracted to normalize.
fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let caps = constants::DATETIME_REGEX.captures(text)?;
    let field = |name: &str| caps.name(name).map(|m| m.as_str());
    let number = |name: &str| -> Option<u32> { field(name)?.parse().ok() };

    let date = NaiveDate::from_ymd_opt(number("y")? as i32, number("mo")?, number("d")?)?;
    let time = if field("h").is_some() {
        let millis = match field("ms") {
            Some(run) => run.parse().ok()?,
            None => 0,
        };
        NaiveTime::from_hms_milli_opt(number("h")?, number("mi")?, number("s")?, millis)?
    } else {
        NaiveTime::MIN
    };
    let local = NaiveDateTime::new(date, time);

    match field("zone") {
        None | Some("Z") => Some(local),
        Some(zone) => {
            // the sign is a single ASCII byte, so slicing past it is safe
            let digits = &zone[1..];
            let (hours_text, minutes_text) =
                digits.split_once(':').unwrap_or_else(|| digits.split_at(2));
            let hours: i64 = hours_text.parse().ok()?;
            let minutes: i64 = minutes_text.parse().ok()?;
            if hours >= 24 || minutes >= 60 {
                return None;
            }
            let shift = TimeDelta::try_seconds((hours * 60 + minutes) * 60)?;
            Some(if zone.starts_with('-') {
                local + shift
            } else {
                local - shift
            })
        }
    }
}

/// Milliseconds per duration unit, largest first. Duration literals write
/// their components in this order, e.g. `1d2h3m4s5ms`.
const UNIT_TABLE: [(&str, i64); 5] = [
    ("d", MS_PER_DAY),
    ("h", MS_PER_HOUR),
    ("m", MS_PER_MINUTE),
    ("s", MS_PER_SECOND),
    ("ms", 1),
];

/// Parse a duration: an optional `-`, then one or more `<integer><unit>`
/// pairs with units drawn from `d|h|m|s|ms` in strictly decreasing
/// magnitude. The total must fit in signed 64-bit milliseconds.
fn parse_duration(text: &str) -> Option<Duration> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(tail) => (true, tail),
        None => (false, text),
    };
    if body.is_empty() {
        return None;
    }
    let mut rest = body;
    let mut remaining_units: &[(&str, i64)] = &UNIT_TABLE;
    let mut total: i64 = 0;
    while !rest.is_empty() {
        // a run of digits, then a unit; digits with no unit after them are
        // malformed
        let digits_len = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits_len == 0 {
            return None;
        }
        let count: i64 = rest[..digits_len].parse().ok()?;
        rest = &rest[digits_len..];
        // `m` means minutes only when not immediately followed by `s`
        let unit_len = if rest.starts_with("ms") { 2 } else { 1 };
        let unit = rest.get(..unit_len)?;
        let position = remaining_units.iter().position(|(name, _)| *name == unit)?;
        let (_, unit_ms) = remaining_units[position];
        remaining_units = &remaining_units[position + 1..];
        rest = &rest[unit_len..];
        // accumulate with the sign applied so i64::MIN stays reachable
        let step = count.checked_mul(unit_ms)?;
        total = if negative {
            total.checked_sub(step)?
        } else {
            total.checked_add(step)?
        };
    }
    Some(Duration { ms: total })
}

const EXTENSION_NAME: &str = "datetime";

fn extension_err(msg: impl Into<String>) -> EvaluationError {
    EvaluationError::failed_extension_function_application(EXTENSION_NAME.into(), msg.into())
}

fn as_datetime(v: &Value) -> Result<&Datetime, EvaluationError> {
    match v {
        Value::Ext(ExtensionValue::Datetime(dt)) => Ok(dt),
        Value::Lit(Literal::String(_)) => Err(EvaluationError::type_error_with_advice(
            nonempty![Type::Extension {
                name: "datetime".into(),
            }],
            Type::String,
            "strings are not datetimes; wrap the literal in the `datetime` constructor".into(),
        )),
        _ => Err(EvaluationError::type_error(
            nonempty![Type::Extension {
                name: "datetime".into(),
            }],
            v.type_of(),
        )),
    }
}

fn as_duration(v: &Value) -> Result<&Duration, EvaluationError> {
    match v {
        Value::Ext(ExtensionValue::Duration(d)) => Ok(d),
        Value::Lit(Literal::String(_)) => Err(EvaluationError::type_error_with_advice(
            nonempty![Type::Extension {
                name: "duration".into(),
            }],
            Type::String,
            "strings are not durations; wrap the literal in the `duration` constructor".into(),
        )),
        _ => Err(EvaluationError::type_error(
            nonempty![Type::Extension {
                name: "duration".into(),
            }],
            v.type_of(),
        )),
    }
}

/// Cedar function that constructs a `datetime` Cedar type from a Cedar
/// string
fn datetime_from_str(arg: &Value) -> evaluator::Result<Value> {
    let str = arg.get_as_string()?;
    let dt = parse_datetime(str)
        .ok_or_else(|| extension_err(format!("`{str}` is not a well-formed datetime")))?;
    Ok(Value::Ext(ExtensionValue::Datetime(dt.into())))
}

/// Cedar function that constructs a `duration` Cedar type from a Cedar
/// string
fn duration_from_str(arg: &Value) -> evaluator::Result<Value> {
    let str = arg.get_as_string()?;
    let d = parse_duration(str)
        .ok_or_else(|| extension_err(format!("`{str}` is not a well-formed duration")))?;
    Ok(Value::Ext(ExtensionValue::Duration(d)))
}

fn datetime_to_date(arg: &Value) -> evaluator::Result<Value> {
    let dt = as_datetime(arg)?;
    let date = dt
        .to_date()
        .ok_or_else(|| extension_err("overflow truncating datetime to date"))?;
    Ok(Value::Ext(ExtensionValue::Datetime(date)))
}

fn datetime_to_time(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::Ext(ExtensionValue::Duration(
        as_datetime(arg)?.to_time(),
    )))
}

fn datetime_offset(arg: &Value, d: &Value) -> evaluator::Result<Value> {
    let dt = as_datetime(arg)?
        .offset(as_duration(d)?)
        .ok_or_else(|| extension_err("overflow offsetting datetime"))?;
    Ok(Value::Ext(ExtensionValue::Datetime(dt)))
}

fn datetime_duration_since(arg: &Value, other: &Value) -> evaluator::Result<Value> {
    let d = as_datetime(arg)?
        .duration_since(as_datetime(other)?)
        .ok_or_else(|| extension_err("overflow computing duration between datetimes"))?;
    Ok(Value::Ext(ExtensionValue::Duration(d)))
}

fn duration_to_milliseconds(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_duration(arg)?.to_milliseconds()))
}

fn duration_to_seconds(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_duration(arg)?.to_seconds()))
}

fn duration_to_minutes(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_duration(arg)?.to_minutes()))
}

fn duration_to_hours(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_duration(arg)?.to_hours()))
}

fn duration_to_days(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_duration(arg)?.to_days()))
}

/// Construct the extension
pub fn extension() -> Extension {
    Extension::new(
        EXTENSION_NAME,
        vec![
            ExtensionFunction::unary(
                "datetime",
                CallStyle::FunctionStyle,
                Box::new(datetime_from_str),
            ),
            ExtensionFunction::unary(
                "duration",
                CallStyle::FunctionStyle,
                Box::new(duration_from_str),
            ),
            ExtensionFunction::unary("toDate", CallStyle::MethodStyle, Box::new(datetime_to_date)),
            ExtensionFunction::unary("toTime", CallStyle::MethodStyle, Box::new(datetime_to_time)),
            ExtensionFunction::binary("offset", CallStyle::MethodStyle, Box::new(datetime_offset)),
            ExtensionFunction::binary(
                "durationSince",
                CallStyle::MethodStyle,
                Box::new(datetime_duration_since),
            ),
            ExtensionFunction::unary(
                "toMilliseconds",
                CallStyle::MethodStyle,
                Box::new(duration_to_milliseconds),
            ),
            ExtensionFunction::unary(
                "toSeconds",
                CallStyle::MethodStyle,
                Box::new(duration_to_seconds),
            ),
            ExtensionFunction::unary(
                "toMinutes",
                CallStyle::MethodStyle,
                Box::new(duration_to_minutes),
            ),
            ExtensionFunction::unary(
                "toHours",
                CallStyle::MethodStyle,
                Box::new(duration_to_hours),
            ),
            ExtensionFunction::unary("toDays", CallStyle::MethodStyle, Box::new(duration_to_days)),
        ],
    )
}

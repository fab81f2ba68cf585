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

//! This module contains the Cedar 'ipaddr' extension.

use crate::ast::{Literal, StaticallyTyped, Type, Value};
use crate::evaluator::{self, EvaluationError};
use crate::extensions::{CallStyle, Extension, ExtensionFunction, ExtensionValue};
use nonempty::nonempty;
use std::net::{Ipv4Addr, Ipv6Addr};

/// IPAddr value, represented as an address (IPv4 or IPv6) plus a prefix
/// length. An address without an explicit prefix carries the full width of
/// its family (`/32` or `/128`).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct IPAddr {
    /// the actual address, without prefix
    addr: std::net::IpAddr,
    /// prefix length; at most [`Self::family_bits`] for the family
    prefix: u8,
}

/// The IPv4 loopback block, 127.0.0.0/8
const V4_LOOPBACK: IPAddr = IPAddr {
    addr: std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 0)),
    prefix: 8,
};
/// The IPv6 loopback address, ::1
const V6_LOOPBACK: IPAddr = IPAddr {
    addr: std::net::IpAddr::V6(Ipv6Addr::LOCALHOST),
    prefix: 128,
};
/// The IPv4 multicast block, 224.0.0.0/4
const V4_MULTICAST: IPAddr = IPAddr {
    addr: std::net::IpAddr::V4(Ipv4Addr::new(224, 0, 0, 0)),
    prefix: 4,
};
/// The IPv6 multicast block, ff00::/8
const V6_MULTICAST: IPAddr = IPAddr {
    addr: std::net::IpAddr::V6(Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0)),
    prefix: 8,
};

impl IPAddr {
    /// Whether this is an IPv4 address
    fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// Whether this is an IPv6 address
    fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    /// Address width in bits for this value's family
    fn family_bits(&self) -> u8 {
        match self.addr {
            std::net::IpAddr::V4(_) => 32,
            std::net::IpAddr::V6(_) => 128,
        }
    }

    /// The lowest and highest addresses covered by this value, widened to
    /// u128 so both families share one representation. IPv4 addresses
    /// occupy the low 32 bits.
    fn bounds(&self) -> (u128, u128) {
        let raw = match self.addr {
            std::net::IpAddr::V4(v4) => u128::from(u32::from(v4)),
            std::net::IpAddr::V6(v6) => u128::from(v6),
        };
        let host_bits = u32::from(self.family_bits() - self.prefix);
        // all-ones in the host portion; a full-width prefix has no host
        // bits, and shifting u128 by 128 is not defined
        let span = if host_bits == 0 {
            0
        } else {
            u128::MAX >> (128 - host_bits)
        };
        (raw & !span, raw | span)
    }

    /// Whether this is a loopback range (within 127.0.0.0/8 or ::1)
    fn is_loopback(&self) -> bool {
        self.is_in_range(if self.is_ipv4() {
            &V4_LOOPBACK
        } else {
            &V6_LOOPBACK
        })
    }

    /// Whether this is a multicast range (within 224.0.0.0/4 or ff00::/8)
    fn is_multicast(&self) -> bool {
        self.is_in_range(if self.is_ipv4() {
            &V4_MULTICAST
        } else {
            &V6_MULTICAST
        })
    }

    /// Whether the range of `self` is entirely contained in the range of
    /// `other`. Always false across families.
    fn is_in_range(&self, other: &Self) -> bool {
        if self.is_ipv4() != other.is_ipv4() {
            return false;
        }
        let (low, high) = self.bounds();
        let (other_low, other_high) = other.bounds();
        other_low <= low && high <= other_high
    }
}

/// Parse a prefix length: decimal digits with no sign and no leading
/// zeros, at most the family width.
fn parse_prefix(text: &str, bits: u8) -> Result<u8, String> {
    let canonical =
        text == "0" || (!text.starts_with('0') && text.bytes().all(|b| b.is_ascii_digit()));
    if text.is_empty() || !canonical {
        return Err(format!("`{text}` is not a valid prefix length"));
    }
    match text.parse::<u8>() {
        Ok(prefix) if prefix <= bits => Ok(prefix),
        _ => Err(format!("prefix length `{text}` does not fit /{bits}")),
    }
}

impl std::str::FromStr for IPAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_text, prefix_text) = match s.split_once('/') {
            Some((addr_text, prefix_text)) => (addr_text, Some(prefix_text)),
            None => (s, None),
        };
        // an IPv4 literal is never a valid IPv6 literal, so try the
        // narrower family first
        let addr: std::net::IpAddr = match addr_text.parse::<Ipv4Addr>() {
            Ok(v4) => v4.into(),
            Err(_) => addr_text
                .parse::<Ipv6Addr>()
                .map_err(|e| format!("could not parse `{addr_text}` as an IP address: {e}"))?
                .into(),
        };
        let bits = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix_text {
            Some(text) => parse_prefix(text, bits)?,
            None => bits,
        };
        Ok(Self { addr, prefix })
    }
}

impl std::fmt::Display for IPAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix == self.family_bits() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}/{}", self.addr, self.prefix)
        }
    }
}

const EXTENSION_NAME: &str = "ipaddr";

fn extension_err(msg: impl Into<String>) -> EvaluationError {
    EvaluationError::failed_extension_function_application(EXTENSION_NAME.into(), msg.into())
}

/// Help message to display when a String was provided where an ipaddr
/// value was expected.
const ADVICE_MSG: &str = "strings are not IP values; wrap the literal in the `ip` constructor";

/// Cedar function which constructs an `ipaddr` Cedar type from a Cedar
/// string
fn ip_from_str(arg: &Value) -> evaluator::Result<Value> {
    let str = arg.get_as_string()?;
    let ip = str.parse::<IPAddr>().map_err(extension_err)?;
    Ok(Value::Ext(ExtensionValue::Ip(ip)))
}

fn as_ipaddr(v: &Value) -> Result<&IPAddr, EvaluationError> {
    match v {
        Value::Ext(ExtensionValue::Ip(ip)) => Ok(ip),
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
            v.type_of(),
        )),
    }
}

/// Cedar function which tests whether an `ipaddr` Cedar type is an IPv4
/// address, returning a Cedar bool
fn is_ipv4(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_ipaddr(arg)?.is_ipv4()))
}

/// Cedar function which tests whether an `ipaddr` Cedar type is an IPv6
/// address, returning a Cedar bool
fn is_ipv6(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_ipaddr(arg)?.is_ipv6()))
}

/// Cedar function which tests whether an `ipaddr` Cedar type is a loopback
/// address, returning a Cedar bool
fn is_loopback(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_ipaddr(arg)?.is_loopback()))
}

/// Cedar function which tests whether an `ipaddr` Cedar type is a
/// multicast address, returning a Cedar bool
fn is_multicast(arg: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(as_ipaddr(arg)?.is_multicast()))
}

/// Cedar function which tests whether the first `ipaddr` Cedar type is in
/// the IP range represented by the second `ipaddr` Cedar type, returning a
/// Cedar bool
fn is_in_range(child: &Value, parent: &Value) -> evaluator::Result<Value> {
    Ok(Value::from(
        as_ipaddr(child)?.is_in_range(as_ipaddr(parent)?),
    ))
}

/// Construct the extension
pub fn extension() -> Extension {
    Extension::new(
        EXTENSION_NAME,
        vec![
            ExtensionFunction::unary("ip", CallStyle::FunctionStyle, Box::new(ip_from_str)),
            ExtensionFunction::unary("isIpv4", CallStyle::MethodStyle, Box::new(is_ipv4)),
            ExtensionFunction::unary("isIpv6", CallStyle::MethodStyle, Box::new(is_ipv6)),
            ExtensionFunction::unary("isLoopback", CallStyle::MethodStyle, Box::new(is_loopback)),
            ExtensionFunction::unary(
                "isMulticast",
                CallStyle::MethodStyle,
                Box::new(is_multicast),
            ),
            ExtensionFunction::binary("isInRange", CallStyle::MethodStyle, Box::new(is_in_range)),
        ],
    )
}

#[cfg(test)]
// PANIC SAFETY: Unit Test Code
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use cool_asserts::assert_matches;

    fn parse(s: &str) -> IPAddr {
        s.parse().unwrap()
    }

    #[test]
    fn ip_parsing() {
        assert_matches!("127.0.0.1".parse::<IPAddr>(), Ok(_));
        assert_matches!("127.0.0.1/24".parse::<IPAddr>(), Ok(_));
        assert_matches!("::1".parse::<IPAddr>(), Ok(_));
        assert_matches!("a:b:c:d::/16".parse::<IPAddr>(), Ok(_));
        assert_matches!("::ffff:127.0.0.1".parse::<IPAddr>(), Ok(_));

        assert_matches!("".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0.1.0".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0.256".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0.1/".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0.1/33".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0.1/-1".parse::<IPAddr>(), Err(_));
        assert_matches!("127.0.0.1/01".parse::<IPAddr>(), Err(_));
        assert_matches!("::1/129".parse::<IPAddr>(), Err(_));
        assert_matches!("garbage".parse::<IPAddr>(), Err(_));
    }

    #[test]
    fn ip_classification() {
        assert!(parse("1.2.3.4").is_ipv4());
        assert!(!parse("1.2.3.4").is_ipv6());
        assert!(parse("a:b:c:d::").is_ipv6());

        assert!(parse("127.0.0.1").is_loopback());
        assert!(parse("127.255.255.255").is_loopback());
        assert!(!parse("128.0.0.1").is_loopback());
        assert!(parse("::1").is_loopback());
        assert!(!parse("::2").is_loopback());
        // a range wider than the loopback block is not loopback
        assert!(!parse("127.0.0.1/4").is_loopback());

        assert!(parse("224.1.2.3").is_multicast());
        assert!(!parse("223.255.255.255").is_multicast());
        assert!(parse("ff00::1").is_multicast());
        assert!(!parse("fe00::1").is_multicast());
    }

    #[test]
    fn ip_ranges() {
        assert!(parse("127.0.0.1").is_in_range(&parse("127.0.0.0/16")));
        assert!(parse("127.0.0.1").is_in_range(&parse("127.0.0.1")));
        assert!(parse("127.0.0.0/24").is_in_range(&parse("127.0.0.0/16")));
        assert!(!parse("127.0.0.0/16").is_in_range(&parse("127.0.0.0/24")));
        assert!(!parse("127.0.1.1").is_in_range(&parse("127.0.0.0/24")));
        assert!(parse("::1").is_in_range(&parse("::/64")));
        // never in range across families
        assert!(!parse("127.0.0.1").is_in_range(&parse("::/0")));
        assert!(!parse("::1").is_in_range(&parse("0.0.0.0/0")));
        // /0 contains everything in its own family
        assert!(parse("8.8.8.8").is_in_range(&parse("0.0.0.0/0")));
    }

    #[test]
    fn ip_equality() {
        assert_eq!(parse("127.0.0.1"), parse("127.0.0.1"));
        assert_eq!(parse("127.0.0.1"), parse("127.0.0.1/32"));
        assert_ne!(parse("127.0.0.1"), parse("127.0.0.1/24"));
        // IPv4 and the equivalent IPv4-mapped IPv6 are distinct values
        assert_ne!(parse("127.0.0.1"), parse("::ffff:127.0.0.1"));
    }

    #[test]
    fn ip_display() {
        assert_eq!(parse("127.0.0.1").to_string(), "127.0.0.1");
        assert_eq!(parse("127.0.0.1/32").to_string(), "127.0.0.1");
        assert_eq!(parse("127.0.0.0/24").to_string(), "127.0.0.0/24");
    }

    #[test]
    fn constructor_rejects_non_string() {
        assert_matches!(ip_from_str(&Value::from(1)), Err(_));
        let e = is_ipv4(&Value::from("1.2.3.4")).unwrap_err();
        assert!(e.to_string().contains(ADVICE_MSG));
    }
}

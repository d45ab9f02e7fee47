use derive_more::{Deref, DerefMut};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt};

///
/// WireType
///
/// The primitive kinds the backing store natively persists. Index key
/// declarations are expressed in these, derived from logical types.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WireType {
    String,
    Numeric,
    Binary,
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::String => "string",
            Self::Numeric => "numeric",
            Self::Binary => "binary",
        };
        write!(f, "{label}")
    }
}

///
/// WireValue
///
/// One typed wire value. Numbers travel as decimal strings so that
/// integer and float attributes share a representation and survive a
/// round trip without precision surprises.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Str(String),
    Num(String),
    Bin(Vec<u8>),
    StrSet(Vec<String>),
    NumSet(Vec<String>),
}

impl WireValue {
    #[must_use]
    pub fn num_from_i64(n: i64) -> Self {
        Self::Num(n.to_string())
    }

    #[must_use]
    pub fn num_from_f64(n: f64) -> Self {
        Self::Num(format_f64(n))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Num(n) => parse_i64(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => n.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Scalar wire kind, used when deriving key schemas. Sets are not
    /// keyable and report the kind of their elements' container instead.
    #[must_use]
    pub const fn wire_type(&self) -> WireType {
        match self {
            Self::Str(_) | Self::StrSet(_) => WireType::String,
            Self::Num(_) | Self::NumSet(_) => WireType::Numeric,
            Self::Bin(_) => WireType::Binary,
        }
    }

    #[must_use]
    pub const fn is_set(&self) -> bool {
        matches!(self, Self::StrSet(_) | Self::NumSet(_))
    }

    /// Total order over scalar wire values, matching the store's key
    /// ordering: numbers numerically, strings lexically, binary bytewise.
    /// Kinds order by discriminant so mixed-kind comparisons stay total.
    #[must_use]
    pub fn key_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => cmp_numeric(a, b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Bin(a), Self::Bin(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    const fn kind_rank(&self) -> u8 {
        match self {
            Self::Str(_) => 0,
            Self::Num(_) => 1,
            Self::Bin(_) => 2,
            Self::StrSet(_) => 3,
            Self::NumSet(_) => 4,
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) | Self::Num(s) => write!(f, "{s}"),
            Self::Bin(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::StrSet(v) => write!(f, "[{}]", v.join(", ")),
            Self::NumSet(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    if let (Some(x), Some(y)) = (parse_i64(a), parse_i64(b)) {
        return x.cmp(&y);
    }
    let x = a.parse::<f64>().unwrap_or(f64::NAN);
    let y = b.parse::<f64>().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

fn parse_i64(s: &str) -> Option<i64> {
    s.parse::<i64>().ok()
}

/// Format an f64 so that integral values stay parseable as integers and
/// fractional values round-trip exactly.
#[must_use]
pub fn format_f64(n: f64) -> String {
    // `{}` uses the shortest representation that round-trips.
    format!("{n}")
}

///
/// WireItem
///
/// A persisted row: a flat map of attribute name to typed wire value.
/// Contains every non-`no_save` attribute whose encoded value is
/// non-omitted, plus the key attributes always.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Deref, DerefMut)]
pub struct WireItem(BTreeMap<String, WireValue>);

impl WireItem {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, name: impl Into<String>, value: WireValue) {
        self.0.insert(name.into(), value);
    }
}

impl FromIterator<(String, WireValue)> for WireItem {
    fn from_iter<T: IntoIterator<Item = (String, WireValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ordering_is_numeric_not_lexical() {
        let a = WireValue::Num("9".into());
        let b = WireValue::Num("10".into());
        assert_eq!(a.key_cmp(&b), Ordering::Less);
    }

    #[test]
    fn numeric_ordering_handles_floats() {
        let a = WireValue::Num("2.5".into());
        let b = WireValue::Num("2.25".into());
        assert_eq!(a.key_cmp(&b), Ordering::Greater);
    }

    #[test]
    fn string_ordering_is_lexical() {
        let a = WireValue::Str("alpha".into());
        let b = WireValue::Str("beta".into());
        assert_eq!(a.key_cmp(&b), Ordering::Less);
    }

    #[test]
    fn integral_floats_format_without_fraction() {
        assert_eq!(format_f64(1.0), "1");
        assert_eq!(format_f64(2.25), "2.25");
    }
}

//! Parameter domains and the interval type they are refined into.

use std::fmt;
use std::str::FromStr;

/// A closed real interval `[min, max]`.
///
/// Numeric parameter values are carried through the search as intervals
/// and only resolved to a concrete number once a ground instance is
/// extracted. The textual form is `"[min, max]"`.
///
/// # Examples
///
/// ```
/// use u_configsearch::model::Interval;
///
/// let iv: Interval = "[0.5, 2]".parse().unwrap();
/// assert_eq!(iv, Interval::new(0.5, 2.0));
/// assert_eq!(iv.to_string(), "[0.5, 2]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (inclusive).
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A degenerate interval containing a single point.
    pub fn point(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Absolute length `max - min`.
    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    /// Relative length `max / min - 1`.
    ///
    /// Only meaningful for strictly positive intervals; for `min <= 0`
    /// the absolute length is returned instead so that the measure stays
    /// finite and shrinks under refinement.
    pub fn relative_length(&self) -> f64 {
        if self.min > 0.0 {
            self.max / self.min - 1.0
        } else {
            self.length()
        }
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    pub fn midpoint(&self) -> f64 {
        self.min + self.length() / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether `other` lies entirely within this interval.
    pub fn contains_interval(&self, other: &Interval) -> bool {
        other.min >= self.min && other.max <= self.max
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| format!("interval must be enclosed in brackets: {s}"))?;
        let mut parts = inner.split(',');
        let (Some(lo), Some(hi), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("interval must have exactly two bounds: {s}"));
        };
        let min: f64 = lo
            .trim()
            .parse()
            .map_err(|_| format!("invalid lower bound in {s}"))?;
        let max: f64 = hi
            .trim()
            .parse()
            .map_err(|_| format!("invalid upper bound in {s}"))?;
        if min > max {
            return Err(format!("lower bound exceeds upper bound in {s}"));
        }
        Ok(Interval { min, max })
    }
}

/// Domain of a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NumericDomain {
    /// Smallest admissible value.
    pub min: f64,
    /// Largest admissible value.
    pub max: f64,
    /// Whether only integral values are admissible.
    pub is_integer: bool,
}

impl NumericDomain {
    pub fn new(min: f64, max: f64, is_integer: bool) -> Self {
        Self {
            min,
            max,
            is_integer,
        }
    }

    /// A real-valued domain.
    pub fn real(min: f64, max: f64) -> Self {
        Self::new(min, max, false)
    }

    /// An integer-valued domain.
    pub fn integer(min: f64, max: f64) -> Self {
        Self::new(min, max, true)
    }

    pub fn interval(&self) -> Interval {
        Interval::new(self.min, self.max)
    }

    /// The same kind of domain narrowed to `interval`.
    pub fn with_interval(&self, interval: Interval) -> Self {
        Self::new(interval.min, interval.max, self.is_integer)
    }

    /// Number of integers in `[ceil(min), floor(max)]`.
    pub fn integer_count(&self) -> i64 {
        let count = self.max.floor() - self.min.ceil() + 1.0;
        if count <= 0.0 {
            0
        } else {
            count as i64
        }
    }

    pub fn subsumes(&self, other: &NumericDomain) -> bool {
        self.interval().contains_interval(&other.interval())
    }
}

/// Domain of a categorical parameter: an ordered set of admissible values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoricalDomain {
    /// Admissible values, without duplicates, in declaration order.
    pub values: Vec<String>,
}

impl CategoricalDomain {
    /// Creates a domain; duplicate values are dropped (first occurrence wins).
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for v in values {
            let v = v.into();
            if !out.contains(&v) {
                out.push(v);
            }
        }
        Self { values: out }
    }

    pub fn singleton(value: impl Into<String>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn is_singleton(&self) -> bool {
        self.values.len() == 1
    }

    pub fn subsumes(&self, other: &CategoricalDomain) -> bool {
        other.values.iter().all(|v| self.contains(v))
    }
}

/// The domain of a parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterDomain {
    Numeric(NumericDomain),
    Categorical(CategoricalDomain),
}

impl ParameterDomain {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ParameterDomain::Numeric(_))
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, ParameterDomain::Categorical(_))
    }

    pub fn as_numeric(&self) -> Option<&NumericDomain> {
        match self {
            ParameterDomain::Numeric(d) => Some(d),
            ParameterDomain::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&CategoricalDomain> {
        match self {
            ParameterDomain::Categorical(d) => Some(d),
            ParameterDomain::Numeric(_) => None,
        }
    }

    /// Whether every value of `other` is also admissible in `self`.
    ///
    /// Domains of different kinds never subsume each other.
    pub fn subsumes(&self, other: &ParameterDomain) -> bool {
        match (self, other) {
            (ParameterDomain::Numeric(a), ParameterDomain::Numeric(b)) => a.subsumes(b),
            (ParameterDomain::Categorical(a), ParameterDomain::Categorical(b)) => a.subsumes(b),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ParameterDomain::Numeric(d) => d.min > d.max,
            ParameterDomain::Categorical(d) => d.values.is_empty(),
        }
    }
}

impl fmt::Display for ParameterDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterDomain::Numeric(d) => {
                let kind = if d.is_integer { "int" } else { "real" };
                write!(f, "{kind}{}", d.interval())
            }
            ParameterDomain::Categorical(d) => write!(f, "{{{}}}", d.values.join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parse_roundtrip_format() {
        let iv = Interval::new(0.0, 2.5);
        assert_eq!(iv.to_string(), "[0, 2.5]");
        let parsed: Interval = "[0,2.5]".parse().unwrap();
        assert_eq!(parsed, iv);
    }

    #[test]
    fn test_interval_parse_rejects_garbage() {
        assert!("0, 1".parse::<Interval>().is_err());
        assert!("[1]".parse::<Interval>().is_err());
        assert!("[a, 1]".parse::<Interval>().is_err());
        assert!("[2, 1]".parse::<Interval>().is_err());
        assert!("[1, 2, 3]".parse::<Interval>().is_err());
    }

    #[test]
    fn test_relative_length_guard() {
        assert!((Interval::new(1.0, 4.0).relative_length() - 3.0).abs() < 1e-12);
        // Non-positive lower bound falls back to absolute length.
        assert!((Interval::new(0.0, 4.0).relative_length() - 4.0).abs() < 1e-12);
        assert!((Interval::new(-2.0, 4.0).relative_length() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_integer_count() {
        assert_eq!(NumericDomain::integer(0.0, 10.0).integer_count(), 11);
        assert_eq!(NumericDomain::integer(0.5, 3.5).integer_count(), 3);
        assert_eq!(NumericDomain::integer(0.2, 0.8).integer_count(), 0);
    }

    #[test]
    fn test_numeric_subsumes() {
        let outer = ParameterDomain::Numeric(NumericDomain::real(0.0, 10.0));
        let inner = ParameterDomain::Numeric(NumericDomain::real(2.0, 3.0));
        assert!(outer.subsumes(&inner));
        assert!(!inner.subsumes(&outer));
    }

    #[test]
    fn test_categorical_subsumes_and_dedup() {
        let all = CategoricalDomain::new(["a", "b", "a", "c"]);
        assert_eq!(all.values, vec!["a", "b", "c"]);
        let b = CategoricalDomain::singleton("b");
        assert!(all.subsumes(&b));
        assert!(!b.subsumes(&all));
    }

    #[test]
    fn test_mixed_kinds_never_subsume() {
        let n = ParameterDomain::Numeric(NumericDomain::real(0.0, 1.0));
        let c = ParameterDomain::Categorical(CategoricalDomain::singleton("x"));
        assert!(!n.subsumes(&c));
        assert!(!c.subsumes(&n));
    }
}

//! RedPath expressions: slash-separated navigation with optional bracketed
//! index and filter selectors, e.g. `/Systems[0]/Storage[Id=RAID.1]/Drives`.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::RedfishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::LessEqual => ordering != Ordering::Greater,
            CompareOp::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::Greater => ">",
            CompareOp::LessEqual => "<=",
            CompareOp::GreaterEqual => ">=",
        };
        f.write_str(op)
    }
}

/// Bracketed selector applied to a collection, an array or a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `[*]` or a bare `*` segment.
    Any,
    /// `[last()]`
    Last,
    /// `[Prop]`
    Exists(String),
    /// `[Prop<op>value]`
    Compare {
        property: String,
        op: CompareOp,
        value: String,
    },
}

impl Filter {
    /// Tests a single JSON object. `Any` and `Last` are positional and are
    /// resolved by the caller.
    pub fn matches(&self, json: &Value) -> bool {
        match self {
            Filter::Any | Filter::Last => true,
            Filter::Exists(property) => json.get(property).is_some(),
            Filter::Compare {
                property,
                op,
                value,
            } => match json.get(property) {
                Some(actual) => compare(actual, *op, value),
                None => false,
            },
        }
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &str) -> bool {
    match actual {
        Value::String(s) => op.holds(s.as_str().cmp(expected)),
        Value::Number(n) => match (n.as_i64(), expected.trim().parse::<i64>()) {
            (Some(lhs), Ok(rhs)) => op.holds(lhs.cmp(&rhs)),
            _ => match (n.as_f64(), expected.trim().parse::<f64>()) {
                (Some(lhs), Ok(rhs)) => lhs.partial_cmp(&rhs).map_or(false, |o| op.holds(o)),
                _ => false,
            },
        },
        Value::Bool(b) => op.holds(if *b { "true" } else { "false" }.cmp(expected)),
        Value::Null => op.holds("null".cmp(expected)),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Property name; a numeric name also indexes collections and arrays.
    Property(String),
    Index(usize),
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedPath {
    /// Starts at the service root rather than the current payload.
    pub absolute: bool,
    pub segments: Vec<Segment>,
}

impl FromStr for RedPath {
    type Err = RedfishError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let absolute = path.starts_with('/');
        let mut segments = Vec::new();

        for part in path.split('/').filter(|part| !part.is_empty()) {
            parse_segment(part, &mut segments)?;
        }

        Ok(RedPath { absolute, segments })
    }
}

fn parse_segment(part: &str, segments: &mut Vec<Segment>) -> Result<(), RedfishError> {
    let (name, mut rest) = match part.find('[') {
        Some(start) => (&part[..start], &part[start..]),
        None => (part, ""),
    };

    if name == "*" {
        segments.push(Segment::Filter(Filter::Any));
    } else if !name.is_empty() {
        segments.push(Segment::Property(name.to_string()));
    } else if rest.is_empty() {
        return Err(RedfishError::InvalidPath(part.to_string()));
    }

    while !rest.is_empty() {
        let close = rest
            .find(']')
            .ok_or_else(|| RedfishError::InvalidPath(format!("unterminated selector in {}", part)))?;
        segments.push(parse_selector(&rest[1..close], part)?);
        rest = &rest[close + 1..];
        if !rest.is_empty() && !rest.starts_with('[') {
            return Err(RedfishError::InvalidPath(format!("unexpected text after selector in {}", part)));
        }
    }
    Ok(())
}

fn parse_selector(selector: &str, part: &str) -> Result<Segment, RedfishError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(RedfishError::InvalidPath(format!("empty selector in {}", part)));
    }
    if let Ok(index) = selector.parse::<usize>() {
        return Ok(Segment::Index(index));
    }
    if selector == "*" {
        return Ok(Segment::Filter(Filter::Any));
    }
    if selector == "last()" {
        return Ok(Segment::Filter(Filter::Last));
    }

    let Some(op_start) = selector.find(|c: char| matches!(c, '<' | '>' | '=' | '!')) else {
        return Ok(Segment::Filter(Filter::Exists(selector.to_string())));
    };
    let property = selector[..op_start].trim();
    let tail = &selector[op_start..];
    let (op, len) = if tail.starts_with("<=") {
        (CompareOp::LessEqual, 2)
    } else if tail.starts_with(">=") {
        (CompareOp::GreaterEqual, 2)
    } else if tail.starts_with("!=") {
        (CompareOp::NotEqual, 2)
    } else if tail.starts_with('<') {
        (CompareOp::Less, 1)
    } else if tail.starts_with('>') {
        (CompareOp::Greater, 1)
    } else if tail.starts_with('=') {
        (CompareOp::Equal, 1)
    } else {
        return Err(RedfishError::InvalidPath(format!("unknown operator in {}", part)));
    };
    if property.is_empty() {
        return Err(RedfishError::InvalidPath(format!("missing property in {}", part)));
    }

    Ok(Segment::Filter(Filter::Compare {
        property: property.to_string(),
        op,
        value: tail[len..].trim().to_string(),
    }))
}

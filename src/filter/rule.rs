use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::data::model::Scalar;
use crate::error::RuleError;

// ---------------------------------------------------------------------------
// Operators and the phrase table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Contains,
    NotContains,
    In,
    NotIn,
    IsNull,
    NotNull,
    Between,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Contains => "contains",
            Operator::NotContains => "not contains",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::IsNull => "is null",
            Operator::NotNull => "is not null",
            Operator::Between => "between",
        }
    }

    /// Null checks carry no value.
    pub fn takes_value(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::NotNull)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Accepted operator phrases, most specific first. A phrase must come before
/// every shorter phrase it contains; `phrase_table_is_longest_first` checks it.
pub const OPERATOR_PHRASES: &[(&str, Operator)] = &[
    ("greater than or equal to", Operator::Ge),
    ("greater than or equal", Operator::Ge),
    ("less than or equal to", Operator::Le),
    ("less than or equal", Operator::Le),
    ("greater than", Operator::Gt),
    ("less than", Operator::Lt),
    ("is not null", Operator::NotNull),
    ("not contains", Operator::NotContains),
    ("not equals", Operator::Ne),
    ("not equal", Operator::Ne),
    ("between", Operator::Between),
    ("contains", Operator::Contains),
    ("is null", Operator::IsNull),
    ("equals", Operator::Eq),
    ("not in", Operator::NotIn),
    ("equal", Operator::Eq),
    ("in", Operator::In),
];

static PHRASE_PATTERNS: LazyLock<Vec<(Regex, Operator)>> = LazyLock::new(|| {
    OPERATOR_PHRASES
        .iter()
        .map(|(phrase, op)| {
            let words: Vec<String> = phrase.split(' ').map(regex::escape).collect();
            let pattern = format!(r"\b{}\b", words.join(r"\s+"));
            (Regex::new(&pattern).expect("operator phrase pattern"), *op)
        })
        .collect()
});

static RULE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s+(.+)$").expect("rule shape pattern"));

// ---------------------------------------------------------------------------
// Parsed predicate
// ---------------------------------------------------------------------------

/// The value side of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleValue {
    /// Null checks.
    None,
    Single(Scalar),
    /// `lo and hi`, used by `between`.
    Range(Scalar, Scalar),
    /// `[a, b, c]`, used by `in` / `not in`.
    List(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPredicate {
    /// Upper-cased column name; matched against the data ignoring case.
    pub column: String,
    pub operator: Operator,
    pub value: RuleValue,
}

impl fmt::Display for ParsedPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.operator)?;
        match &self.value {
            RuleValue::None => Ok(()),
            RuleValue::Single(v) => write!(f, " {v}"),
            RuleValue::Range(lo, hi) => write!(f, " {lo} and {hi}"),
            RuleValue::List(items) => {
                let items: Vec<String> = items.iter().map(Scalar::to_string).collect();
                write!(f, " [{}]", items.join(", "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse `<column> <operator phrase> <value>` into a predicate.
///
/// The text is trimmed and lowercased first. The operator is the phrase that
/// starts leftmost after the column; ties go to the earlier (more specific)
/// entry of [`OPERATOR_PHRASES`], so `greater than or equal 5` is `>=` and
/// never `>` with a value of `or equal 5`.
pub fn parse_rule(text: &str) -> Result<ParsedPredicate, RuleError> {
    let normalized = text.trim().to_lowercase();
    let syntax = |reason: &str| RuleError::Syntax {
        rule: normalized.clone(),
        reason: reason.to_string(),
    };

    let caps = RULE_SHAPE
        .captures(&normalized)
        .ok_or_else(|| syntax("expected `<column> <operator> <value>`"))?;
    let column = caps[1].to_uppercase();
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let (operator, value_start) = find_operator(rest).ok_or_else(|| RuleError::UnknownOperator {
        rule: normalized.clone(),
    })?;
    let value_text = rest[value_start..].trim();

    let value = if !operator.takes_value() {
        RuleValue::None
    } else if value_text.is_empty() {
        return Err(syntax("missing value"));
    } else if matches!(operator, Operator::Contains | Operator::NotContains) {
        // Substring tests keep the text as written, so `007` stays `007`.
        RuleValue::Single(Scalar::String(unquote(value_text).to_string()))
    } else {
        parse_value(value_text).map_err(|reason| syntax(&reason))?
    };

    Ok(ParsedPredicate {
        column,
        operator,
        value,
    })
}

/// Locate the operator phrase; returns it with the byte offset just past it.
fn find_operator(rest: &str) -> Option<(Operator, usize)> {
    let mut best: Option<(usize, Operator, usize)> = None;
    for (pattern, op) in PHRASE_PATTERNS.iter() {
        let Some(m) = pattern.find(rest) else {
            continue;
        };
        // Strictly-less keeps the earlier table entry on ties.
        if best.map_or(true, |(start, _, _)| m.start() < start) {
            best = Some((m.start(), *op, m.end()));
        }
    }
    best.map(|(_, op, end)| (op, end))
}

fn parse_value(text: &str) -> Result<RuleValue, String> {
    if text.starts_with('[') && text.ends_with(']') {
        let items = text[1..text.len() - 1]
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(parse_scalar)
            .collect();
        return Ok(RuleValue::List(items));
    }

    if text.contains(" and ") {
        let parts: Vec<&str> = text.split(" and ").collect();
        return match parts.as_slice() {
            [lo, hi] => Ok(RuleValue::Range(parse_scalar(lo), parse_scalar(hi))),
            _ => Err(format!(
                "expected exactly two values around `and`, found {}",
                parts.len()
            )),
        };
    }

    Ok(RuleValue::Single(parse_scalar(text)))
}

fn unquote(text: &str) -> &str {
    text.trim().trim_matches(|c: char| c == '"' || c == '\'')
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Parse one literal: float if it has a decimal point, else integer, else the
/// trimmed text without surrounding quotes. Integers too large for `i64` are
/// read as floats. Never fails.
pub fn parse_scalar(text: &str) -> Scalar {
    let value = unquote(text);

    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            return Scalar::Float(f);
        }
    } else if let Ok(i) = value.parse::<i64>() {
        return Scalar::Integer(i);
    } else if is_integer_text(value) {
        if let Ok(f) = value.parse::<f64>() {
            return Scalar::Float(f);
        }
    }
    Scalar::String(value.to_string())
}

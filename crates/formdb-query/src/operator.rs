//! Filter comparison operators.

use std::fmt;

/// A comparison a client can ask for in a filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// Text contains the value.
    Contains,
    /// Text starts with the value.
    StartsWith,
    /// Between two values, both inclusive.
    Between,
    /// One of a comma-separated list of values.
    In,
}

impl Operator {
    /// Parse an operator token.
    ///
    /// Accepts the SQL symbols, the compact client tokens (`~`, `^`, `><`,
    /// `@`) and the operator names. An empty token means equality.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let op = match token {
            "" | "=" | "==" => Operator::Equal,
            "!=" | "<>" => Operator::NotEqual,
            "<" => Operator::Less,
            "<=" => Operator::LessOrEqual,
            ">" => Operator::Greater,
            ">=" => Operator::GreaterOrEqual,
            "~" => Operator::Contains,
            "^" => Operator::StartsWith,
            "><" => Operator::Between,
            "@" => Operator::In,
            _ => match token.to_ascii_lowercase().as_str() {
                "eq" | "equal" => Operator::Equal,
                "ne" | "notequal" => Operator::NotEqual,
                "lt" | "less" => Operator::Less,
                "le" | "lessorequal" => Operator::LessOrEqual,
                "gt" | "greater" => Operator::Greater,
                "ge" | "greaterorequal" => Operator::GreaterOrEqual,
                "contains" => Operator::Contains,
                "startswith" => Operator::StartsWith,
                "between" => Operator::Between,
                "in" => Operator::In,
                _ => return None,
            },
        };
        Some(op)
    }

    /// Name used in messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::Between => "between",
            Operator::In => "in",
        }
    }

    /// SQL symbol for the simple comparisons, `None` for the rest.
    pub const fn comparison(self) -> Option<&'static str> {
        match self {
            Operator::Equal
            | Operator::NotEqual
            | Operator::Less
            | Operator::LessOrEqual
            | Operator::Greater
            | Operator::GreaterOrEqual => Some(self.as_str()),
            _ => None,
        }
    }

    /// Whether the operator only makes sense on text.
    pub const fn is_text_only(self) -> bool {
        matches!(self, Operator::Contains | Operator::StartsWith)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Normalized ticker symbol, e.g. `AAPL` or `BRK.B`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trim and uppercase `input`, then check it is a plain ticker.
    ///
    /// Symbols end up in upstream URL paths and cache keys, so only ASCII
    /// letters, digits, `.` and `-` are allowed, starting with a letter.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let ticker = input.trim().to_ascii_uppercase();

        match ticker.chars().count() {
            0 => return Err(ValidationError::EmptySymbol),
            len if len > MAX_SYMBOL_LEN => {
                return Err(ValidationError::SymbolTooLong {
                    len,
                    max: MAX_SYMBOL_LEN,
                })
            }
            _ => {}
        }

        let mut chars = ticker.chars().enumerate();
        if let Some((_, lead)) = chars.next() {
            if !lead.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch: lead });
            }
        }
        if let Some((index, ch)) =
            chars.find(|(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(*ch, '.' | '-')))
        {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }

        Ok(Self(ticker))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" tsla ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "TSLA");
    }

    #[test]
    fn accepts_share_class_separators() {
        assert_eq!(Symbol::parse("brk.b").expect("valid").as_str(), "BRK.B");
        assert_eq!(Symbol::parse("BF-B").expect("valid").as_str(), "BF-B");
    }

    #[test]
    fn rejects_invalid_start() {
        let err = Symbol::parse("1AAPL").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidStart { .. }));
    }

    #[test]
    fn rejects_overlong_tickers() {
        let err = "ABCDEFGHIJKLMNOP".parse::<Symbol>().expect_err("must fail");
        assert_eq!(err, ValidationError::SymbolTooLong { len: 16, max: 15 });
    }

    #[test]
    fn rejects_path_characters() {
        let err = Symbol::parse("AAPL/prev").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidChar { ch: '/', .. }));
    }
}

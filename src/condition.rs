//! Boolean condition expressions.
//!
//! Manifests guard dependencies and hooks with conditions such as
//! `checkout_android and not checkout_ios` or `host_os == "linux"`. This
//! module evaluates them against a resolved [`VarMap`].
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | compare
//! compare := atom (("==" | "!=") atom)?
//! atom    := "(" expr ")" | IDENT | STRING | INT | "True" | "False"
//! ```
//!
//! Evaluation is strict: an undefined identifier, a non-boolean operand of
//! `and`/`or`/`not`, or a non-boolean result is an error rather than `false`.

use crate::core::GsyncError;
use crate::vars::{Value, VarMap};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    And,
    Or,
    Not,
    Eq,
    Ne,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, GsyncError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expression.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' | '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(GsyncError::evaluation(
                        expression,
                        format!("unsupported operator '{c}'"),
                    ));
                }
                tokens.push(if c == '=' {
                    Token::Eq
                } else {
                    Token::Ne
                });
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(GsyncError::evaluation(expression, "unterminated string literal"));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse().map_err(|_| {
                    GsyncError::evaluation(expression, format!("invalid integer '{text}'"))
                })?;
                tokens.push(Token::Int(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(GsyncError::evaluation(
                    expression,
                    format!("unsupported character '{other}'"),
                ));
            }
        }
    }

    Ok(tokens)
}

struct Evaluator<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    vars: &'a VarMap,
}

impl Evaluator<'_> {
    fn error(&self, reason: impl Into<String>) -> GsyncError {
        GsyncError::evaluation(self.expression, reason)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect_bool(&self, value: Value, operator: &str) -> Result<bool, GsyncError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(self.error(format!(
                "'{operator}' needs a bool operand, got {} '{other}'",
                other.type_name()
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Value, GsyncError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            let l = self.expect_bool(left, "or")?;
            let r = self.expect_bool(right, "or")?;
            left = Value::Bool(l || r);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, GsyncError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_not()?;
            let l = self.expect_bool(left, "and")?;
            let r = self.expect_bool(right, "and")?;
            left = Value::Bool(l && r);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Value, GsyncError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let operand = self.parse_not()?;
            return Ok(Value::Bool(!self.expect_bool(operand, "not")?));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Value, GsyncError> {
        let left = self.parse_atom()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.next();
                let right = self.parse_atom()?;
                Ok(Value::Bool(left == right))
            }
            Some(Token::Ne) => {
                self.next();
                let right = self.parse_atom()?;
                Ok(Value::Bool(left != right))
            }
            _ => Ok(left),
        }
    }

    fn parse_atom(&mut self) -> Result<Value, GsyncError> {
        match self.next() {
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Int(i)) => Ok(Value::Int(i)),
            Some(Token::Ident(name)) => match name.as_str() {
                "True" | "true" => Ok(Value::Bool(true)),
                "False" | "false" => Ok(Value::Bool(false)),
                _ => self
                    .vars
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| self.error(format!("undefined variable '{name}'"))),
            },
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// Evaluate `expression` against `vars`.
pub fn evaluate(expression: &str, vars: &VarMap) -> Result<bool, GsyncError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(GsyncError::evaluation(expression, "empty expression"));
    }

    let mut evaluator = Evaluator {
        expression,
        tokens,
        pos: 0,
        vars,
    };
    let value = evaluator.parse_or()?;
    if evaluator.pos != evaluator.tokens.len() {
        return Err(evaluator.error("trailing tokens after expression"));
    }
    evaluator.expect_bool(value, "condition")
}

/// AND two optional conditions, parenthesising each side.
#[must_use]
pub fn combine(parent: Option<&str>, child: Option<&str>) -> Option<String> {
    match (parent, child) {
        (None, None) => None,
        (Some(p), None) => Some(p.to_string()),
        (None, Some(c)) => Some(c.to_string()),
        (Some(p), Some(c)) if p == c => Some(p.to_string()),
        (Some(p), Some(c)) => Some(format!("({p}) and ({c})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> VarMap {
        [
            ("checkout_linux".to_string(), Value::Bool(true)),
            ("checkout_win".to_string(), Value::Bool(false)),
            ("host_os".to_string(), Value::from("linux")),
            ("level".to_string(), Value::Int(3)),
        ]
        .into()
    }

    #[test]
    fn test_simple_identifiers() {
        assert!(evaluate("checkout_linux", &vars()).unwrap());
        assert!(!evaluate("checkout_win", &vars()).unwrap());
    }

    #[test]
    fn test_boolean_operators_and_precedence() {
        let vars = vars();
        assert!(evaluate("checkout_linux and not checkout_win", &vars).unwrap());
        assert!(evaluate("checkout_win or checkout_linux", &vars).unwrap());
        // `and` binds tighter than `or`
        assert!(evaluate("checkout_linux or checkout_win and checkout_win", &vars).unwrap());
        assert!(!evaluate("(checkout_linux or checkout_win) and checkout_win", &vars).unwrap());
        assert!(evaluate("not not checkout_linux", &vars).unwrap());
    }

    #[test]
    fn test_comparisons() {
        let vars = vars();
        assert!(evaluate("host_os == \"linux\"", &vars).unwrap());
        assert!(evaluate("host_os != 'mac'", &vars).unwrap());
        assert!(evaluate("level == 3", &vars).unwrap());
        assert!(evaluate("checkout_linux == True", &vars).unwrap());
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let err = evaluate("checkout_linux and typo_var", &vars()).unwrap_err();
        assert!(err.to_string().contains("typo_var"));
    }

    #[test]
    fn test_unsupported_operator_is_an_error() {
        assert!(evaluate("checkout_linux = checkout_win", &vars()).is_err());
        assert!(evaluate("checkout_linux && checkout_win", &vars()).is_err());
        assert!(evaluate("level < 4", &vars()).is_err());
    }

    #[test]
    fn test_non_boolean_result_is_an_error() {
        assert!(evaluate("host_os", &vars()).is_err());
        assert!(evaluate("level and checkout_linux", &vars()).is_err());
        assert!(evaluate("", &vars()).is_err());
        assert!(evaluate("(checkout_linux", &vars()).is_err());
        assert!(evaluate("checkout_linux checkout_win", &vars()).is_err());
    }

    #[test]
    fn test_combine() {
        assert_eq!(combine(None, None), None);
        assert_eq!(combine(Some("a"), None).as_deref(), Some("a"));
        assert_eq!(combine(None, Some("b")).as_deref(), Some("b"));
        assert_eq!(combine(Some("a"), Some("b")).as_deref(), Some("(a) and (b)"));
        assert_eq!(combine(Some("a"), Some("a")).as_deref(), Some("a"));
    }
}

//! Parsing of the model's structured request.
//!
//! The model answers with a JSON object:
//!
//! ```text
//! {"query": "dinosaurs", "filter": "and(eq(\"year\", 1993), gt(\"imdb.rating\", 7))", "limit": 2}
//! ```
//!
//! Two stages can fail, and they fail differently. A payload that is not a
//! well-formed JSON object of that shape is an `AppError::FilterParse`; a
//! `filter` string that does not follow the predicate grammar is an
//! `AppError::FilterGrammar`.
//!
//! Grammar of the `filter` string:
//!
//! ```text
//! filter     := "NO_FILTER" | "" | call
//! call       := NAME "(" [ arg { "," arg } ] ")"
//! comparison := COMPARATOR "(" attribute "," value ")"
//! operation  := OPERATOR "(" call { "," call } ")"
//! attribute  := STRING | NAME
//! value      := STRING | NUMBER | "true" | "false" | "[" [ value { "," value } ] "]"
//! ```

use super::filter::{Comparator, Filter, FilterValue, Operator};
use docquery_core::{AppError, AppResult};
use serde_json::Value;

/// Filter value meaning "no filter".
pub const NO_FILTER: &str = "NO_FILTER";

/// A parsed structured request.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    /// Rewritten query text to embed; may be empty
    pub query: String,

    /// Metadata filter, if the model produced one
    pub filter: Option<Filter>,

    /// Number of documents the user asked for
    pub limit: Option<usize>,
}

/// Parse the raw model output into a [`StructuredQuery`].
///
/// The filter is parsed but not yet checked against a schema.
pub fn parse_structured_output(text: &str) -> AppResult<StructuredQuery> {
    let value = extract_json(text)?;
    let object = value.as_object().ok_or_else(|| {
        AppError::FilterParse("Structured request must be a JSON object".to_string())
    })?;

    let query = match object.get("query") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => {
            return Err(AppError::FilterParse(
                "'query' must be a string".to_string(),
            ))
        }
        None => {
            return Err(AppError::FilterParse(
                "Structured request has no 'query'".to_string(),
            ))
        }
    };

    let filter = match object.get("filter") {
        Some(Value::String(s)) => parse_filter(s)?,
        Some(_) => {
            return Err(AppError::FilterParse(
                "'filter' must be a string".to_string(),
            ))
        }
        None => {
            return Err(AppError::FilterParse(
                "Structured request has no 'filter'".to_string(),
            ))
        }
    };

    let limit = match object.get("limit") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(0) => None,
            Some(n) => Some(n as usize),
            None => {
                return Err(AppError::FilterParse(format!(
                    "'limit' must be a non-negative integer, got {}",
                    n
                )))
            }
        },
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(other) => {
            return Err(AppError::FilterParse(format!(
                "'limit' must be an integer, got {}",
                other
            )))
        }
    };

    Ok(StructuredQuery {
        query,
        filter,
        limit,
    })
}

/// Parse a filter expression. `NO_FILTER` and blank input mean no filter.
pub fn parse_filter(text: &str) -> AppResult<Option<Filter>> {
    let text = text.trim();
    if text.is_empty() || text == NO_FILTER {
        return Ok(None);
    }

    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let filter = parser.call()?;
    if let Some(token) = parser.peek() {
        return Err(grammar(format!("Unexpected {} after filter", token)));
    }
    Ok(Some(filter))
}

/// Pull the JSON payload out of the model output, tolerating a markdown fence.
fn extract_json(text: &str) -> AppResult<Value> {
    let mut body = text.trim();
    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        }
        .trim();
    }

    serde_json::from_str(body).or_else(|first| {
        // Models sometimes wrap the object in prose
        match (body.find('{'), body.rfind('}')) {
            (Some(open), Some(close)) if open < close => {
                serde_json::from_str(&body[open..=close]).map_err(|_| {
                    AppError::FilterParse(format!("Model output is not valid JSON: {}", first))
                })
            }
            _ => Err(AppError::FilterParse(format!(
                "Model output is not valid JSON: {}",
                first
            ))),
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(n) => write!(f, "'{}'", n),
            Self::Str(s) => write!(f, "string {:?}", s),
            Self::Number(n) => write!(f, "number {}", n),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::Comma => write!(f, "','"),
        }
    }
}

fn grammar(message: String) -> AppError {
    AppError::FilterGrammar(message)
}

fn tokenize(text: &str) -> AppResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
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
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(grammar("Unterminated string".to_string())),
                        Some('\\') if quote == '"' => {
                            match chars.get(i + 1) {
                                Some(escaped) => value.push(*escaped),
                                None => {
                                    return Err(grammar("Unterminated string".to_string()))
                                }
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E' | '-' | '+'))
                {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.'))
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(grammar(format!("Unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> AppResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| grammar("Unexpected end of filter".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> AppResult<()> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(grammar(format!("Expected {}, found {}", expected, token)))
        }
    }

    fn call(&mut self) -> AppResult<Filter> {
        let name = match self.next()? {
            Token::Name(name) => name,
            other => return Err(grammar(format!("Expected a function, found {}", other))),
        };
        self.expect(Token::LParen)?;

        if let Some(comparator) = Comparator::parse(&name) {
            let attribute = match self.next()? {
                Token::Str(s) | Token::Name(s) => s,
                other => {
                    return Err(grammar(format!(
                        "Expected an attribute name in {}(), found {}",
                        name, other
                    )))
                }
            };
            self.expect(Token::Comma)?;
            let value = self.value()?;
            self.expect(Token::RParen)?;
            return Ok(Filter::comparison(comparator, attribute, value));
        }

        if let Some(operator) = Operator::parse(&name) {
            let mut arguments = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                arguments.push(self.call()?);
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    arguments.push(self.call()?);
                }
            }
            self.expect(Token::RParen)?;
            return Ok(Filter::operation(operator, arguments));
        }

        Err(grammar(format!("Unknown function '{}'", name)))
    }

    fn value(&mut self) -> AppResult<FilterValue> {
        match self.next()? {
            Token::Str(s) => Ok(FilterValue::String(s)),
            Token::Number(n) => parse_number(&n),
            Token::Name(n) => match n.as_str() {
                "true" | "True" | "TRUE" => Ok(FilterValue::Bool(true)),
                "false" | "False" | "FALSE" => Ok(FilterValue::Bool(false)),
                _ => Err(grammar(format!("Unquoted value '{}'", n))),
            },
            Token::LBracket => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    items.push(self.value()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                        items.push(self.value()?);
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(FilterValue::List(items))
            }
            other => Err(grammar(format!("Expected a value, found {}", other))),
        }
    }
}

fn parse_number(text: &str) -> AppResult<FilterValue> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(FilterValue::Integer(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .map(FilterValue::Float)
        .ok_or_else(|| grammar(format!("Malformed number '{}'", text)))
}

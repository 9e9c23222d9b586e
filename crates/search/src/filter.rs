//! OData filter expressions for the in-memory index.
//!
//! Supports the subset the retrieval pipeline emits:
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | primary
//! primary := "(" expr ")"
//!          | field ("eq" | "ne") literal
//!          | "search.ismatch" "(" string ")"
//! ```
//!
//! Single-quoted literals escape a quote by doubling it (`'O''Brien'`);
//! double-quoted strings escape with a backslash.

use groundchat_core::error::SearchError;

/// A parsed filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Eq { field: String, value: String },
    Ne { field: String, value: String },
    IsMatch(String),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}

/// What a filter is evaluated against.
pub trait Filterable {
    /// All values of a field. Scalar fields yield at most one value;
    /// collection fields may yield several. Unknown fields yield none.
    fn field_values(&self, field: &str) -> Vec<&str>;

    /// Whether `term` occurs in any full-text searchable field.
    fn matches_term(&self, term: &str) -> bool;
}

impl FilterExpr {
    /// Parse a filter string.
    pub fn parse(input: &str) -> Result<Self, SearchError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(invalid(format!("unexpected trailing token {token:?}"))),
        }
    }

    /// Evaluate against a document.
    pub fn matches<D: Filterable + ?Sized>(&self, doc: &D) -> bool {
        match self {
            FilterExpr::Eq { field, value } => doc.field_values(field).contains(&value.as_str()),
            FilterExpr::Ne { field, value } => !doc.field_values(field).contains(&value.as_str()),
            FilterExpr::IsMatch(term) => doc.matches_term(term),
            FilterExpr::And(a, b) => a.matches(doc) && b.matches(doc),
            FilterExpr::Or(a, b) => a.matches(doc) || b.matches(doc),
            FilterExpr::Not(inner) => !inner.matches(doc),
        }
    }
}

fn invalid(message: impl Into<String>) -> SearchError {
    SearchError::Request(format!("invalid filter: {}", message.into()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(String),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, SearchError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            value.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => value.push(ch),
                        None => return Err(invalid("unterminated string literal")),
                    }
                }
                tokens.push(Token::Literal(value));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(ch) => value.push(ch),
                            None => return Err(invalid("dangling escape")),
                        },
                        Some('"') => break,
                        Some(ch) => value.push(ch),
                        None => return Err(invalid("unterminated string literal")),
                    }
                }
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '/' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '/' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(ident)) if ident.eq_ignore_ascii_case(word) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), SearchError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(invalid(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn or(&mut self) -> Result<FilterExpr, SearchError> {
        let mut left = self.and()?;
        while self.keyword("or") {
            let right = self.and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<FilterExpr, SearchError> {
        let mut left = self.unary()?;
        while self.keyword("and") {
            let right = self.unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<FilterExpr, SearchError> {
        if self.keyword("not") {
            return Ok(FilterExpr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<FilterExpr, SearchError> {
        match self.next() {
            Some(Token::LParen) => {
                let expr = self.or()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) if name.eq_ignore_ascii_case("search.ismatch") => {
                self.expect(Token::LParen)?;
                let term = match self.next() {
                    Some(Token::Literal(term)) => term,
                    other => return Err(invalid(format!("search.ismatch expects a string, found {other:?}"))),
                };
                self.expect(Token::RParen)?;
                Ok(FilterExpr::IsMatch(term))
            }
            Some(Token::Ident(field)) => {
                let negate = if self.keyword("eq") {
                    false
                } else if self.keyword("ne") {
                    true
                } else {
                    return Err(invalid(format!("expected 'eq' or 'ne' after '{field}'")));
                };
                let value = match self.next() {
                    Some(Token::Literal(value)) => value,
                    other => return Err(invalid(format!("expected literal, found {other:?}"))),
                };
                Ok(if negate {
                    FilterExpr::Ne { field, value }
                } else {
                    FilterExpr::Eq { field, value }
                })
            }
            other => Err(invalid(format!("unexpected token {other:?}"))),
        }
    }
}

use crate::error::ParseError;
use crate::value::Value;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(
        r#"^(?:(?P<number>(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|\[(?P<bracket>[^\]]+)\]|"(?P<dquote>(?:[^"\\]|\\.)*)"|'(?P<squote>(?:[^'\\]|\\.)*)'|(?P<symbol>&&|\|\||==|!=|<=|>=|[-+*/%^()<>!=,]))"#
    )
    .unwrap();
}

/// Parentheses, calls, unary prefixes and exponents may nest this deep.
const MAX_NESTING: usize = 64;

/// Operators, calls included, allowed in one expression. Bounds the tree height.
const MAX_OPERATORS: usize = 512;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

/// A parsed calculation expression. Immutable once constructed.
///
/// `dependencies` holds every variable name the expression reads, whether it
/// names a raw row field or another calculation's result column.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    raw_input: String,
    dependencies: BTreeSet<String>,
    ast: Expr,
}

impl Expression {
    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_input)
    }
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_expression(s)
    }
}

/// Parses expression text into an [`Expression`].
///
/// # Arguments
/// * `text` - Source text, e.g. `sum_ab * 2` or `concat([First Name], " ", last)`
///
/// # Returns
/// * The parsed expression with its dependency names, or a [`ParseError`]
///   describing the first malformed position
///
/// # Notes
/// * Function names are not checked here. An unknown function fails at
///   evaluation time, row by row.
pub fn parse_expression(text: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::EmptyExpression);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
        operators: 0,
        dependencies: BTreeSet::new(),
    };
    let ast = parser.parse_or()?;
    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(ParseError::UnexpectedToken {
            position: *position,
            found: token.to_string(),
            expected: "end of expression",
        });
    }

    Ok(Expression {
        raw_input: text.to_string(),
        dependencies: parser.dependencies,
        ast,
    })
}

#[derive(Clone, Debug, PartialEq)]
enum Token<'a> {
    Number(f64),
    Ident(&'a str),
    Bracketed(&'a str),
    Str(String),
    Symbol(&'a str),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Bracketed(name) => write!(f, "[{}]", name),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Symbol(s) => write!(f, "{}", s),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token<'_>)>, ParseError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        pos += rest.len() - trimmed.len();

        let captures = match TOKEN_REGEX.captures(trimmed) {
            Some(captures) => captures,
            None => {
                let found = trimmed.chars().next().unwrap_or(' ');
                return Err(ParseError::UnexpectedCharacter {
                    position: pos,
                    found,
                });
            }
        };

        let token = if let Some(m) = captures.name("number") {
            let n = m
                .as_str()
                .parse::<f64>()
                .map_err(|_| ParseError::UnexpectedCharacter {
                    position: pos,
                    found: m.as_str().chars().next().unwrap_or('0'),
                })?;
            Token::Number(n)
        } else if let Some(m) = captures.name("ident") {
            Token::Ident(&trimmed[m.range()])
        } else if let Some(m) = captures.name("bracket") {
            Token::Bracketed(trimmed[m.range()].trim())
        } else if let Some(m) = captures.name("dquote").or_else(|| captures.name("squote")) {
            Token::Str(unescape(m.as_str()))
        } else if let Some(m) = captures.name("symbol") {
            Token::Symbol(&trimmed[m.range()])
        } else {
            unreachable!("token regex has no other alternatives")
        };

        // The whole match always starts at 0 because the pattern is anchored.
        let consumed = captures.get(0).map_or(0, |m| m.end());
        tokens.push((pos, token));
        pos += consumed;
    }

    Ok(tokens)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_keyword(name: &str, keyword: &str) -> bool {
    name.eq_ignore_ascii_case(keyword)
}

struct Parser<'a> {
    tokens: Vec<(usize, Token<'a>)>,
    pos: usize,
    nesting: usize,
    operators: usize,
    dependencies: BTreeSet<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn advance(&mut self) -> Option<(usize, Token<'a>)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token if it is one of `symbols` (or a matching keyword).
    fn eat(&mut self, symbols: &[&str], keyword: Option<&str>) -> Option<&'a str> {
        let matched = match self.peek() {
            Some(Token::Symbol(s)) if symbols.contains(s) => Some(*s),
            Some(Token::Ident(name)) if keyword.is_some_and(|k| is_keyword(name, k)) => {
                Some(*name)
            }
            _ => None,
        };
        if matched.is_some() {
            self.pos += 1;
        }
        matched
    }

    /// Offset of the next token, or of the last one at end of input.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(position, _)| *position)
    }

    fn count_operator(&mut self) -> Result<(), ParseError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(ParseError::TooDeep {
                position: self.offset(),
            });
        }
        Ok(())
    }

    fn expect_symbol(&mut self, symbol: &'static str) -> Result<(), ParseError> {
        match self.advance() {
            Some((_, Token::Symbol(s))) if s == symbol => Ok(()),
            Some((position, token)) => Err(ParseError::UnexpectedToken {
                position,
                found: token.to_string(),
                expected: symbol,
            }),
            None => Err(ParseError::UnexpectedEnd { expected: symbol }),
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(&["||"], Some("or")).is_some() {
            self.count_operator()?;
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.eat(&["&&"], Some("and")).is_some() {
            self.count_operator()?;
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        while let Some(symbol) = self.eat(&["==", "=", "!="], None) {
            self.count_operator()?;
            let op = if symbol == "!=" {
                BinaryOp::NotEqual
            } else {
                BinaryOp::Equal
            };
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        while let Some(symbol) = self.eat(&["<", "<=", ">", ">="], None) {
            self.count_operator()?;
            let op = match symbol {
                "<" => BinaryOp::Less,
                "<=" => BinaryOp::LessEqual,
                ">" => BinaryOp::Greater,
                _ => BinaryOp::GreaterEqual,
            };
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(symbol) = self.eat(&["+", "-"], None) {
            self.count_operator()?;
            let op = if symbol == "+" {
                BinaryOp::Add
            } else {
                BinaryOp::Subtract
            };
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(symbol) = self.eat(&["*", "/", "%"], None) {
            self.count_operator()?;
            let op = match symbol {
                "*" => BinaryOp::Multiply,
                "/" => BinaryOp::Divide,
                _ => BinaryOp::Modulo,
            };
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(ParseError::TooDeep {
                position: self.offset(),
            });
        }
        let expr = self.parse_prefixed()?;
        self.nesting -= 1;
        Ok(expr)
    }

    fn parse_prefixed(&mut self) -> Result<Expr, ParseError> {
        let op = match self.eat(&["-", "!", "+"], Some("not")) {
            Some("-") => Some(UnaryOp::Negate),
            Some("+") => return self.parse_unary(),
            Some(_) => Some(UnaryOp::Not),
            None => None,
        };
        match op {
            Some(op) => {
                self.count_operator()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if self.eat(&["^"], None).is_some() {
            self.count_operator()?;
            // Right associative; the exponent may carry its own sign.
            let exponent = self.parse_unary()?;
            return Ok(Self::binary(BinaryOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let (position, token) = self.advance().ok_or(ParseError::UnexpectedEnd {
            expected: "a value",
        })?;

        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::Bracketed(name) => Ok(self.variable(name)),
            Token::Symbol("(") => {
                let inner = self.parse_or()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Token::Ident(name) if is_keyword(name, "true") => Ok(Expr::Literal(Value::Boolean(true))),
            Token::Ident(name) if is_keyword(name, "false") => {
                Ok(Expr::Literal(Value::Boolean(false)))
            }
            Token::Ident(name) if is_keyword(name, "null") => Ok(Expr::Literal(Value::Absent)),
            Token::Ident(name)
                if ["and", "or", "not"].iter().any(|k| is_keyword(name, k)) =>
            {
                Err(ParseError::UnexpectedToken {
                    position,
                    found: name.to_string(),
                    expected: "a value",
                })
            }
            Token::Ident(name) => {
                if self.eat(&["("], None).is_some() {
                    self.count_operator()?;
                    let args = self.parse_arguments()?;
                    Ok(Expr::Call {
                        name: name.to_string(),
                        args,
                    })
                } else {
                    Ok(self.variable(name))
                }
            }
            other => Err(ParseError::UnexpectedToken {
                position,
                found: other.to_string(),
                expected: "a value",
            }),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(&[")"], None).is_some() {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&[","], None).is_some() {
                continue;
            }
            self.expect_symbol(")")?;
            return Ok(args);
        }
    }

    fn variable(&mut self, name: &str) -> Expr {
        self.dependencies.insert(name.to_string());
        Expr::Variable(name.to_string())
    }
}

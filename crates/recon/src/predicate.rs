// Predicate language for custom rule code blocks.
// Supports: source_value / target_value, string + number literals, true/false/null,
// comparison (== != < > <= >=), boolean (and or not, && || !), arithmetic (+ - * / %),
// function calls (lower(x)) and method sugar (x.lower()).
// A Python-style `def ...:` header, `return` keyword and `#` comments are accepted.

use thiserror::Error;

use crate::matcher::normalize_text;
use crate::model::{format_number, Value};

pub const MAX_CODE_BYTES: usize = 4096;
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("code block is empty")]
    Empty,
    #[error("code block exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("predicate produced {0}, expected a boolean")]
    NotBoolean(&'static str),
}

/// A compiled code block. Cheap to share across scoring threads.
#[derive(Debug, Clone)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    pub fn compile(code: &str) -> Result<Self, PredicateError> {
        if code.len() > MAX_CODE_BYTES {
            return Err(PredicateError::TooLarge {
                limit: MAX_CODE_BYTES,
            });
        }
        let body = strip_wrapper(code);
        let tokens = tokenize(&body)?;
        if tokens.is_empty() {
            return Err(PredicateError::Empty);
        }
        let (expr, pos) = parse_or(&tokens, 0, 0)?;
        if pos < tokens.len() {
            return Err(PredicateError::Syntax(format!(
                "unexpected {} after expression",
                tokens[pos].describe()
            )));
        }
        Ok(Self { expr })
    }

    /// Evaluate against one source/target value pair.
    pub fn eval(&self, source: &Value, target: &Value) -> Result<bool, PredicateError> {
        let env = Env {
            source: PValue::from(source),
            target: PValue::from(target),
        };
        match eval_expr(&self.expr, &env)? {
            PValue::Bool(b) => Ok(b),
            other => Err(PredicateError::NotBoolean(other.type_name())),
        }
    }
}

// ---------------------------------------------------------------------------
// Source preparation
// ---------------------------------------------------------------------------

fn strip_wrapper(code: &str) -> String {
    let mut body = Vec::new();
    for line in code.lines() {
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if t.starts_with("def ") && t.ends_with(':') {
            continue;
        }
        let t = match t.strip_prefix("return") {
            Some(rest) if rest.is_empty() || rest.starts_with([' ', '\t', '(']) => rest.trim_start(),
            _ => t,
        };
        body.push(t);
    }
    body.join("\n")
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", format_number(*n)),
            Token::Str(s) => format!("string '{s}'"),
            Token::Ident(s) => format!("'{s}'"),
            other => format!("{other:?}"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => { chars.next(); }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' { break; }
                    chars.next();
                }
            }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            '.' => { tokens.push(Token::Dot); chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '%' => { tokens.push(Token::Percent); chars.next(); }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    return Err(PredicateError::Syntax("assignment is not allowed, use '=='".into()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => { tokens.push(Token::LtEq); chars.next(); }
                    Some('>') => { tokens.push(Token::NotEq); chars.next(); }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::GtEq);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' | '|' => {
                chars.next();
                if chars.peek() == Some(&c) {
                    chars.next();
                    tokens.push(if c == '&' { Token::And } else { Token::Or });
                } else {
                    return Err(PredicateError::Syntax(format!("unexpected '{c}', use '{c}{c}'")));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    if ch == '\\' {
                        match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => break,
                        }
                    } else {
                        s.push(ch);
                    }
                }
                if !closed {
                    return Err(PredicateError::Syntax("unterminated string literal".into()));
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut num_str = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num_str.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num = num_str
                    .parse::<f64>()
                    .map_err(|_| PredicateError::Syntax(format!("invalid number '{num_str}'")))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "null" | "None" => Token::Null,
                    _ => Token::Ident(ident),
                });
            }
            other => {
                return Err(PredicateError::Syntax(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// AST + parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Var {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Lower,
    Upper,
    Trim,
    Len,
    Digits,
    Number,
    Text,
    IsNull,
    Contains,
    StartsWith,
    EndsWith,
    Abs,
    Round,
    Similarity,
    Levenshtein,
    Normalize,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name.to_ascii_lowercase().as_str() {
            "lower" => Func::Lower,
            "upper" => Func::Upper,
            "trim" | "strip" => Func::Trim,
            "len" => Func::Len,
            "digits" => Func::Digits,
            "number" | "float" => Func::Number,
            "text" | "str" => Func::Text,
            "is_null" => Func::IsNull,
            "contains" => Func::Contains,
            "starts_with" | "startswith" => Func::StartsWith,
            "ends_with" | "endswith" => Func::EndsWith,
            "abs" => Func::Abs,
            "round" => Func::Round,
            "similarity" => Func::Similarity,
            "levenshtein" => Func::Levenshtein,
            "normalize" => Func::Normalize,
            _ => return None,
        })
    }

    fn arity(self) -> (usize, usize) {
        match self {
            Func::Contains | Func::StartsWith | Func::EndsWith | Func::Similarity | Func::Levenshtein => (2, 2),
            Func::Round => (1, 2),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(PValue),
    Var(Var),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

type ParseResult = Result<(Expr, usize), PredicateError>;

fn check_depth(depth: usize) -> Result<(), PredicateError> {
    if depth > MAX_DEPTH {
        Err(PredicateError::TooDeep { limit: MAX_DEPTH })
    } else {
        Ok(())
    }
}

fn binary(op: Op, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn parse_or(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    check_depth(depth)?;
    let (mut left, mut pos) = parse_and(tokens, pos, depth)?;
    while pos < tokens.len() && tokens[pos] == Token::Or {
        let (right, next) = parse_and(tokens, pos + 1, depth)?;
        left = binary(Op::Or, left, right);
        pos = next;
    }
    Ok((left, pos))
}

fn parse_and(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    let (mut left, mut pos) = parse_not(tokens, pos, depth)?;
    while pos < tokens.len() && tokens[pos] == Token::And {
        let (right, next) = parse_not(tokens, pos + 1, depth)?;
        left = binary(Op::And, left, right);
        pos = next;
    }
    Ok((left, pos))
}

fn parse_not(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    if pos < tokens.len() && tokens[pos] == Token::Not {
        check_depth(depth + 1)?;
        let (inner, next) = parse_not(tokens, pos + 1, depth + 1)?;
        return Ok((Expr::Not(Box::new(inner)), next));
    }
    parse_comparison(tokens, pos, depth)
}

fn parse_comparison(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    let (left, pos) = parse_additive(tokens, pos, depth)?;
    if pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Eq => Some(Op::Eq),
            Token::NotEq => Some(Op::NotEq),
            Token::Lt => Some(Op::Lt),
            Token::Gt => Some(Op::Gt),
            Token::LtEq => Some(Op::LtEq),
            Token::GtEq => Some(Op::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            let (right, next) = parse_additive(tokens, pos + 1, depth)?;
            return Ok((binary(op, left, right), next));
        }
    }
    Ok((left, pos))
}

fn parse_additive(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    let (mut left, mut pos) = parse_multiplicative(tokens, pos, depth)?;
    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, next) = parse_multiplicative(tokens, pos + 1, depth)?;
        left = binary(op, left, right);
        pos = next;
    }
    Ok((left, pos))
}

fn parse_multiplicative(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    let (mut left, mut pos) = parse_unary(tokens, pos, depth)?;
    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            Token::Percent => Op::Rem,
            _ => break,
        };
        let (right, next) = parse_unary(tokens, pos + 1, depth)?;
        left = binary(op, left, right);
        pos = next;
    }
    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    if pos < tokens.len() && tokens[pos] == Token::Minus {
        check_depth(depth + 1)?;
        let (inner, next) = parse_unary(tokens, pos + 1, depth + 1)?;
        return Ok((Expr::Neg(Box::new(inner)), next));
    }
    parse_postfix(tokens, pos, depth)
}

/// `x.lower()` is sugar for `lower(x)`.
fn parse_postfix(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    let (mut expr, mut pos) = parse_primary(tokens, pos, depth)?;
    while pos < tokens.len() && tokens[pos] == Token::Dot {
        let name = match tokens.get(pos + 1) {
            Some(Token::Ident(name)) => name,
            _ => return Err(PredicateError::Syntax("expected method name after '.'".into())),
        };
        if tokens.get(pos + 2) != Some(&Token::LParen) {
            return Err(PredicateError::Syntax(format!("expected '(' after .{name}")));
        }
        let (mut args, next) = parse_call_args(tokens, pos + 3, depth + 1)?;
        args.insert(0, expr);
        expr = make_call(name, args)?;
        pos = next;
    }
    Ok((expr, pos))
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> ParseResult {
    let Some(token) = tokens.get(pos) else {
        return Err(PredicateError::Syntax("unexpected end of expression".into()));
    };
    match token {
        Token::Number(n) => Ok((Expr::Literal(PValue::Num(*n)), pos + 1)),
        Token::Str(s) => Ok((Expr::Literal(PValue::Text(s.clone())), pos + 1)),
        Token::True => Ok((Expr::Literal(PValue::Bool(true)), pos + 1)),
        Token::False => Ok((Expr::Literal(PValue::Bool(false)), pos + 1)),
        Token::Null => Ok((Expr::Literal(PValue::Null), pos + 1)),
        Token::Ident(name) => {
            if tokens.get(pos + 1) == Some(&Token::LParen) {
                let (args, next) = parse_call_args(tokens, pos + 2, depth + 1)?;
                return Ok((make_call(name, args)?, next));
            }
            let var = match name.as_str() {
                "source_value" | "source" => Var::Source,
                "target_value" | "target" => Var::Target,
                _ => return Err(PredicateError::UnknownVariable(name.clone())),
            };
            Ok((Expr::Var(var), pos + 1))
        }
        Token::LParen => {
            let (expr, pos) = parse_or(tokens, pos + 1, depth + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                _ => Err(PredicateError::Syntax("expected ')'".into())),
            }
        }
        other => Err(PredicateError::Syntax(format!("unexpected {}", other.describe()))),
    }
}

/// Parses arguments after the opening paren, consuming the closing one.
fn parse_call_args(tokens: &[Token], mut pos: usize, depth: usize) -> Result<(Vec<Expr>, usize), PredicateError> {
    let mut args = Vec::new();
    if tokens.get(pos) == Some(&Token::RParen) {
        return Ok((args, pos + 1));
    }
    loop {
        let (arg, next) = parse_or(tokens, pos, depth)?;
        args.push(arg);
        pos = next;
        match tokens.get(pos) {
            Some(Token::RParen) => return Ok((args, pos + 1)),
            Some(Token::Comma) => pos += 1,
            _ => return Err(PredicateError::Syntax("expected ',' or ')' in argument list".into())),
        }
    }
}

fn make_call(name: &str, args: Vec<Expr>) -> Result<Expr, PredicateError> {
    let func = Func::lookup(name).ok_or_else(|| PredicateError::UnknownFunction(name.to_string()))?;
    let (min, max) = func.arity();
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}-{max}")
        };
        return Err(PredicateError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(Expr::Call { func, args })
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum PValue {
    Null,
    Bool(bool),
    Num(f64),
    Text(String),
}

impl From<&Value> for PValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => PValue::Null,
            Value::Number(n) => PValue::Num(*n),
            Value::Text(s) => PValue::Text(s.clone()),
        }
    }
}

impl PValue {
    fn type_name(&self) -> &'static str {
        match self {
            PValue::Null => "null",
            PValue::Bool(_) => "boolean",
            PValue::Num(_) => "number",
            PValue::Text(_) => "text",
        }
    }

    fn as_text(&self) -> String {
        match self {
            PValue::Null => String::new(),
            PValue::Bool(b) => b.to_string(),
            PValue::Num(n) => format_number(*n),
            PValue::Text(s) => s.clone(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            PValue::Num(n) => Some(*n),
            PValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    fn expect_number(&self, what: &str) -> Result<f64, PredicateError> {
        self.as_number()
            .ok_or_else(|| PredicateError::Type(format!("{what} needs a number, got {}", self.type_name())))
    }

    fn expect_bool(&self, what: &str) -> Result<bool, PredicateError> {
        match self {
            PValue::Bool(b) => Ok(*b),
            other => Err(PredicateError::Type(format!(
                "{what} needs a boolean, got {}",
                other.type_name()
            ))),
        }
    }
}

struct Env {
    source: PValue,
    target: PValue,
}

fn eval_expr(expr: &Expr, env: &Env) -> Result<PValue, PredicateError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(Var::Source) => Ok(env.source.clone()),
        Expr::Var(Var::Target) => Ok(env.target.clone()),
        Expr::Not(inner) => Ok(PValue::Bool(!eval_expr(inner, env)?.expect_bool("not")?)),
        Expr::Neg(inner) => match eval_expr(inner, env)? {
            PValue::Null => Ok(PValue::Null),
            v => Ok(PValue::Num(-v.expect_number("unary '-'")?)),
        },
        Expr::Binary { op: Op::And, left, right } => {
            if !eval_expr(left, env)?.expect_bool("and")? {
                return Ok(PValue::Bool(false));
            }
            Ok(PValue::Bool(eval_expr(right, env)?.expect_bool("and")?))
        }
        Expr::Binary { op: Op::Or, left, right } => {
            if eval_expr(left, env)?.expect_bool("or")? {
                return Ok(PValue::Bool(true));
            }
            Ok(PValue::Bool(eval_expr(right, env)?.expect_bool("or")?))
        }
        Expr::Binary { op, left, right } => {
            let l = eval_expr(left, env)?;
            let r = eval_expr(right, env)?;
            eval_binary(*op, l, r)
        }
        Expr::Call { func, args } => {
            let values = args
                .iter()
                .map(|a| eval_expr(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            eval_call(*func, &values)
        }
    }
}

fn values_equal(l: &PValue, r: &PValue) -> bool {
    match (l, r) {
        (PValue::Null, PValue::Null) => true,
        (PValue::Null, _) | (_, PValue::Null) => false,
        (PValue::Bool(a), PValue::Bool(b)) => a == b,
        (PValue::Num(a), PValue::Num(b)) => a == b,
        (PValue::Text(a), PValue::Text(b)) => a == b,
        (PValue::Num(_), PValue::Text(_)) | (PValue::Text(_), PValue::Num(_)) => {
            match (l.as_number(), r.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => false,
    }
}

fn compare(l: &PValue, r: &PValue) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (PValue::Null, _) | (_, PValue::Null) => None,
        (PValue::Text(a), PValue::Text(b)) => Some(a.cmp(b)),
        _ => l.as_number()?.partial_cmp(&r.as_number()?),
    }
}

fn eval_binary(op: Op, l: PValue, r: PValue) -> Result<PValue, PredicateError> {
    use std::cmp::Ordering;

    Ok(match op {
        Op::Eq => PValue::Bool(values_equal(&l, &r)),
        Op::NotEq => PValue::Bool(!values_equal(&l, &r)),
        // Ordering against null is simply false
        Op::Lt => PValue::Bool(compare(&l, &r) == Some(Ordering::Less)),
        Op::Gt => PValue::Bool(compare(&l, &r) == Some(Ordering::Greater)),
        Op::LtEq => PValue::Bool(matches!(compare(&l, &r), Some(Ordering::Less | Ordering::Equal))),
        Op::GtEq => PValue::Bool(matches!(compare(&l, &r), Some(Ordering::Greater | Ordering::Equal))),
        Op::Add => match (&l, &r) {
            (PValue::Num(a), PValue::Num(b)) => PValue::Num(a + b),
            (PValue::Text(_), _) | (_, PValue::Text(_)) => {
                PValue::Text(format!("{}{}", l.as_text(), r.as_text()))
            }
            (PValue::Null, _) | (_, PValue::Null) => PValue::Null,
            _ => return Err(PredicateError::Type(format!(
                "cannot add {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        },
        Op::Sub | Op::Mul | Op::Div | Op::Rem => {
            if l == PValue::Null || r == PValue::Null {
                return Ok(PValue::Null);
            }
            let a = l.expect_number("arithmetic")?;
            let b = r.expect_number("arithmetic")?;
            match op {
                Op::Sub => PValue::Num(a - b),
                Op::Mul => PValue::Num(a * b),
                Op::Div | Op::Rem if b == 0.0 => return Err(PredicateError::DivisionByZero),
                Op::Div => PValue::Num(a / b),
                _ => PValue::Num(a % b),
            }
        }
        Op::And => PValue::Bool(l.expect_bool("and")? && r.expect_bool("and")?),
        Op::Or => PValue::Bool(l.expect_bool("or")? || r.expect_bool("or")?),
    })
}

fn map_text(v: &PValue, f: impl Fn(String) -> String) -> PValue {
    match v {
        PValue::Null => PValue::Null,
        other => PValue::Text(f(other.as_text())),
    }
}

fn eval_call(func: Func, args: &[PValue]) -> Result<PValue, PredicateError> {
    let a = &args[0];
    Ok(match func {
        Func::Lower => map_text(a, |s| s.to_lowercase()),
        Func::Upper => map_text(a, |s| s.to_uppercase()),
        Func::Trim => map_text(a, |s| s.trim().to_string()),
        Func::Normalize => map_text(a, |s| normalize_text(&s)),
        Func::Digits => map_text(a, |s| s.chars().filter(|c| c.is_ascii_digit()).collect()),
        Func::Len => PValue::Num(a.as_text().chars().count() as f64),
        Func::Number => a.as_number().map(PValue::Num).unwrap_or(PValue::Null),
        Func::Text => PValue::Text(a.as_text()),
        Func::IsNull => PValue::Bool(matches!(a, PValue::Null)),
        Func::Contains | Func::StartsWith | Func::EndsWith => {
            let b = &args[1];
            if matches!(a, PValue::Null) || matches!(b, PValue::Null) {
                return Ok(PValue::Bool(false));
            }
            let (hay, needle) = (a.as_text(), b.as_text());
            PValue::Bool(match func {
                Func::Contains => hay.contains(&needle),
                Func::StartsWith => hay.starts_with(&needle),
                _ => hay.ends_with(&needle),
            })
        }
        Func::Abs => match a {
            PValue::Null => PValue::Null,
            v => PValue::Num(v.expect_number("abs")?.abs()),
        },
        Func::Round => match a {
            PValue::Null => PValue::Null,
            v => {
                let n = v.expect_number("round")?;
                let places = match args.get(1) {
                    Some(p) => p.expect_number("round")?.clamp(0.0, 15.0) as i32,
                    None => 0,
                };
                let scale = 10f64.powi(places);
                PValue::Num((n * scale).round() / scale)
            }
        },
        Func::Similarity => {
            let b = &args[1];
            if matches!(a, PValue::Null) || matches!(b, PValue::Null) {
                PValue::Num(0.0)
            } else {
                PValue::Num(strsim::jaro_winkler(&a.as_text(), &b.as_text()))
            }
        }
        Func::Levenshtein => PValue::Num(strsim::levenshtein(&a.as_text(), &args[1].as_text()) as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(code: &str, s: Value, t: Value) -> Result<bool, PredicateError> {
        Predicate::compile(code)?.eval(&s, &t)
    }

    #[test]
    fn plain_expression() {
        assert_eq!(eval("source_value == target_value", "a".into(), "a".into()), Ok(true));
        assert_eq!(eval("source == target", "a".into(), "b".into()), Ok(false));
    }

    #[test]
    fn python_wrapper_is_accepted() {
        let code = "def rule_code_block(source_value, target_value):\n    # compare emails\n    return source_value.lower() == target_value.lower()\n";
        assert_eq!(eval(code, "A@X.com".into(), "a@x.COM".into()), Ok(true));
    }

    #[test]
    fn precedence_and_short_circuit() {
        // `and` binds tighter than `or`; right side never evaluated on short-circuit
        assert_eq!(eval("true or 1 / 0 == 1", Value::Null, Value::Null), Ok(true));
        assert_eq!(eval("false and 1 / 0 == 1", Value::Null, Value::Null), Ok(false));
        assert_eq!(eval("1 + 2 * 3 == 7", Value::Null, Value::Null), Ok(true));
        assert_eq!(eval("not false and true", Value::Null, Value::Null), Ok(true));
    }

    #[test]
    fn numeric_tolerance_expression() {
        let code = "abs(number(source_value) - number(target_value)) <= 0.5";
        assert_eq!(eval(code, Value::Number(10.0), "10.4".into()), Ok(true));
        assert_eq!(eval(code, Value::Number(10.0), "11".into()), Ok(false));
    }

    #[test]
    fn digits_and_similarity() {
        assert_eq!(
            eval("digits(source) == digits(target)", "+1 (555) 010".into(), "1555010".into()),
            Ok(true)
        );
        assert_eq!(
            eval("similarity(source, target) > 0.9", "Jonathan".into(), "Jonathon".into()),
            Ok(true)
        );
    }

    #[test]
    fn null_handling() {
        assert_eq!(eval("is_null(source)", Value::Null, "x".into()), Ok(true));
        assert_eq!(eval("source < 5", Value::Null, Value::Null), Ok(false));
        assert_eq!(eval("source == null", Value::Null, Value::Null), Ok(true));
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        assert_eq!(
            eval("lower(source)", "X".into(), "x".into()),
            Err(PredicateError::NotBoolean("text"))
        );
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        assert_eq!(
            eval("number(source) / 0 == 1", Value::Number(1.0), Value::Null),
            Err(PredicateError::DivisionByZero)
        );
    }

    #[test]
    fn compile_rejects_bad_code() {
        assert!(matches!(Predicate::compile(""), Err(PredicateError::Empty)));
        assert!(matches!(Predicate::compile("# only a comment"), Err(PredicateError::Empty)));
        assert!(matches!(Predicate::compile("source = target"), Err(PredicateError::Syntax(_))));
        assert!(matches!(Predicate::compile("foo == 1"), Err(PredicateError::UnknownVariable(_))));
        assert!(matches!(Predicate::compile("exec(source)"), Err(PredicateError::UnknownFunction(_))));
        // other columns are only reachable from rationale templates
        assert!(matches!(Predicate::compile("source.email == 'x'"), Err(PredicateError::Syntax(_))));
        assert!(matches!(Predicate::compile("lower(source, target)"), Err(PredicateError::Arity { .. })));
        assert!(matches!(Predicate::compile("(source == target"), Err(PredicateError::Syntax(_))));
        assert!(matches!(Predicate::compile("'open"), Err(PredicateError::Syntax(_))));
    }

    #[test]
    fn limits_are_enforced() {
        let huge = format!("source == '{}'", "x".repeat(MAX_CODE_BYTES));
        assert!(matches!(Predicate::compile(&huge), Err(PredicateError::TooLarge { .. })));

        let deep = format!("{}true{}", "(".repeat(MAX_DEPTH + 2), ")".repeat(MAX_DEPTH + 2));
        assert!(matches!(Predicate::compile(&deep), Err(PredicateError::TooDeep { .. })));

        let fine = format!("{}true{}", "(".repeat(10), ")".repeat(10));
        assert!(Predicate::compile(&fine).is_ok());
    }
}

//! Element-wise arithmetic expressions over dense arrays and scalars.
//!
//! The language is a small numexpr-like subset:
//!
//! - numeric literals (`3`, `2.5`, `1e-3`), `True` / `False`, variable names
//! - arithmetic `+ - * / % **`, unary `-`
//! - comparisons `< <= > >= == !=`
//! - logical `& | ~` on boolean operands
//! - functions `sqrt abs exp log sin cos tan where(cond, a, b)`
//!
//! Integer operands compute in `i64`, anything involving a float (and every
//! `/`) computes in `f64`, comparisons and logic produce `bool`. Scalars
//! broadcast against arrays; arrays must all have the same length.
//!
//! `&` and `|` bind more loosely than comparisons, so `a > 1 & b < 3` means
//! `(a > 1) & (b < 3)`.

use std::collections::HashMap;
use std::fmt;

use crate::array::Array;
use crate::dtype::{ScalarKind, Value};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn from_symbol(sym: &str) -> Option<Self> {
        Some(match sym {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "**" => BinaryOp::Pow,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&" => BinaryOp::And,
            "|" => BinaryOp::Or,
            _ => return None,
        })
    }

    /// Left and right binding power; `**` is right-associative.
    fn binding_power(self) -> (u8, u8) {
        match self {
            BinaryOp::Or => (1, 2),
            BinaryOp::And => (3, 4),
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => (5, 6),
            BinaryOp::Add | BinaryOp::Sub => (7, 8),
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (9, 10),
            BinaryOp::Pow => (14, 13),
        }
    }
}

const PREFIX_BP: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sqrt,
    Abs,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Where,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "exp" => Func::Exp,
            "log" => Func::Log,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "where" => Func::Where,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Where => 3,
            _ => 1,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Variable names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Unary(_, e) => e.collect_vars(out),
            Expr::Binary(_, l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_vars(out)),
        }
    }
}

// ── tokenizer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Literal),
    Ident(String),
    Symbol(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(Literal::Int(v)) => write!(f, "{v}"),
            Token::Number(Literal::Float(v)) => write!(f, "{v}"),
            Token::Number(Literal::Bool(v)) => write!(f, "{v}"),
            Token::Ident(s) => f.write_str(s),
            Token::Symbol(s) => f.write_str(s),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

const SYMBOLS: &[&str] = &[
    "**", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "<", ">", "&", "|", "~",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) {
            let mut is_float = false;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                is_float |= bytes[i] == b'.';
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                is_float = true;
                i += 1;
                if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                    i += 1;
                }
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &src[start..i];
            let lit = if is_float {
                text.parse::<f64>().map(Literal::Float).ok()
            } else {
                text.parse::<i64>().map(Literal::Int).ok()
            };
            let lit = lit.ok_or_else(|| {
                Error::Expression(format!("invalid number literal '{text}' at offset {start}"))
            })?;
            tokens.push((start, Token::Number(lit)));
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &src[start..i];
            let token = match word {
                "True" => Token::Number(Literal::Bool(true)),
                "False" => Token::Number(Literal::Bool(false)),
                _ => Token::Ident(word.to_string()),
            };
            tokens.push((start, token));
            continue;
        }
        let token = match c {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = token {
            tokens.push((start, token));
            i += 1;
            continue;
        }
        match SYMBOLS.iter().find(|s| src[i..].starts_with(**s)) {
            Some(sym) => {
                tokens.push((start, Token::Symbol(*sym)));
                i += sym.len();
            }
            None => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(Error::Expression(format!(
                    "unexpected character '{ch}' at offset {start}"
                )));
            }
        }
    }
    Ok(tokens)
}

// ── parser ─────────────────────────────────────────────────────────────────

/// Parse `src` into an expression tree.
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(Error::Expression("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr(0)?;
    if let Some((offset, token)) = parser.tokens.get(parser.pos) {
        return Err(Error::Expression(format!(
            "unexpected '{token}' at offset {offset}"
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn bump(&mut self) -> Option<(usize, Token)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        match self.bump() {
            Some((_, t)) if t == want => Ok(()),
            Some((offset, t)) => Err(Error::Expression(format!(
                "expected '{want}' at offset {offset}, found '{t}'"
            ))),
            None => Err(Error::Expression(format!(
                "expected '{want}', found end of expression"
            ))),
        }
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.prefix()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol(sym)) => match BinaryOp::from_symbol(sym) {
                    Some(op) => op,
                    None => break,
                },
                _ => break,
            };
            let (l_bp, r_bp) = op.binding_power();
            if l_bp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.expr(r_bp)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr> {
        let (offset, token) = self
            .bump()
            .ok_or_else(|| Error::Expression("unexpected end of expression".into()))?;
        match token {
            Token::Number(lit) => Ok(Expr::Literal(lit)),
            Token::Ident(name) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Var(name));
                }
                let func = Func::from_name(&name).ok_or_else(|| {
                    Error::Expression(format!("unknown function '{name}' at offset {offset}"))
                })?;
                self.bump();
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.expr(0)?);
                        if self.peek() == Some(&Token::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
                if args.len() != func.arity() {
                    return Err(Error::Expression(format!(
                        "{name}() takes {} argument(s), got {}",
                        func.arity(),
                        args.len()
                    )));
                }
                Ok(Expr::Call(func, args))
            }
            Token::LParen => {
                let inner = self.expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Symbol("-") => Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.expr(PREFIX_BP)?))),
            Token::Symbol("+") => self.expr(PREFIX_BP),
            Token::Symbol("~") => Ok(Expr::Unary(UnaryOp::Not, Box::new(self.expr(PREFIX_BP)?))),
            other => Err(Error::Expression(format!(
                "unexpected '{other}' at offset {offset}"
            ))),
        }
    }
}

// ── evaluation ─────────────────────────────────────────────────────────────

/// A value bound to a variable name.
#[derive(Debug, Clone)]
pub enum Binding {
    Array(Array),
    Scalar(Value),
}

pub type Bindings = HashMap<String, Binding>;

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    Array(Array),
    Scalar(Value),
}

#[derive(Debug, Clone)]
enum Lane<T> {
    Scalar(T),
    Vector(Vec<T>),
}

impl<T: Copy> Lane<T> {
    fn map<R>(self, f: impl Fn(T) -> R) -> Lane<R> {
        match self {
            Lane::Scalar(v) => Lane::Scalar(f(v)),
            Lane::Vector(vs) => Lane::Vector(vs.into_iter().map(f).collect()),
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Lane::Scalar(_) => None,
            Lane::Vector(vs) => Some(vs.len()),
        }
    }

    fn at(&self, i: usize) -> T {
        match self {
            Lane::Scalar(v) => *v,
            Lane::Vector(vs) => vs[i],
        }
    }
}

fn try_zip<A: Copy, B: Copy, R>(
    a: Lane<A>,
    b: Lane<B>,
    f: impl Fn(A, B) -> Result<R>,
) -> Result<Lane<R>> {
    Ok(match (a, b) {
        (Lane::Scalar(x), Lane::Scalar(y)) => Lane::Scalar(f(x, y)?),
        (Lane::Scalar(x), Lane::Vector(ys)) => {
            Lane::Vector(ys.into_iter().map(|y| f(x, y)).collect::<Result<_>>()?)
        }
        (Lane::Vector(xs), Lane::Scalar(y)) => {
            Lane::Vector(xs.into_iter().map(|x| f(x, y)).collect::<Result<_>>()?)
        }
        (Lane::Vector(xs), Lane::Vector(ys)) => {
            if xs.len() != ys.len() {
                return Err(Error::LengthMismatch {
                    expected: xs.len(),
                    actual: ys.len(),
                });
            }
            Lane::Vector(xs.into_iter().zip(ys).map(|(x, y)| f(x, y)).collect::<Result<_>>()?)
        }
    })
}

fn zip<A: Copy, B: Copy, R>(a: Lane<A>, b: Lane<B>, f: impl Fn(A, B) -> R) -> Result<Lane<R>> {
    try_zip(a, b, |x, y| Ok(f(x, y)))
}

#[derive(Debug, Clone)]
enum Data {
    Bool(Lane<bool>),
    Int(Lane<i64>),
    Float(Lane<f64>),
}

enum Pair {
    Int(Lane<i64>, Lane<i64>),
    Float(Lane<f64>, Lane<f64>),
}

impl Data {
    fn type_name(&self) -> &'static str {
        match self {
            Data::Bool(_) => "bool",
            Data::Int(_) => "int64",
            Data::Float(_) => "float64",
        }
    }

    /// Integer lane for bool and int data; float data is handed back.
    fn into_int(self) -> std::result::Result<Lane<i64>, Lane<f64>> {
        match self {
            Data::Bool(l) => Ok(l.map(i64::from)),
            Data::Int(l) => Ok(l),
            Data::Float(l) => Err(l),
        }
    }

    fn into_float(self) -> Lane<f64> {
        widen(self.into_int())
    }

    fn numeric_pair(a: Data, b: Data) -> Pair {
        match (a.into_int(), b.into_int()) {
            (Ok(x), Ok(y)) => Pair::Int(x, y),
            (x, y) => Pair::Float(widen(x), widen(y)),
        }
    }

    fn into_bool(self, what: &str) -> Result<Lane<bool>> {
        match self {
            Data::Bool(l) => Ok(l),
            other => Err(Error::TypeMismatch(format!(
                "{what} needs bool operands, got {}",
                other.type_name()
            ))),
        }
    }

    fn from_array(name: &str, array: &Array) -> Result<Data> {
        let dtype = array.dtype();
        if !dtype.is_scalar() {
            return Err(Error::TypeMismatch(format!(
                "variable '{name}' has multidimensional items ({dtype}), which expressions do not support"
            )));
        }
        macro_rules! ints {
            ($t:ty) => {
                Data::Int(Lane::Vector(
                    array.to_vec::<$t>()?.into_iter().map(i64::from).collect(),
                ))
            };
        }
        Ok(match dtype.kind {
            ScalarKind::Bool => Data::Bool(Lane::Vector(array.to_vec::<bool>()?)),
            ScalarKind::Int8 => ints!(i8),
            ScalarKind::Int16 => ints!(i16),
            ScalarKind::Int32 => ints!(i32),
            ScalarKind::Int64 => Data::Int(Lane::Vector(array.to_vec::<i64>()?)),
            ScalarKind::UInt8 => ints!(u8),
            ScalarKind::UInt16 => ints!(u16),
            ScalarKind::UInt32 => ints!(u32),
            ScalarKind::UInt64 => {
                return Err(Error::TypeMismatch(format!(
                    "variable '{name}' is uint64, which expressions do not support"
                )))
            }
            ScalarKind::Float32 => Data::Float(Lane::Vector(
                array.to_vec::<f32>()?.into_iter().map(f64::from).collect(),
            )),
            ScalarKind::Float64 => Data::Float(Lane::Vector(array.to_vec::<f64>()?)),
        })
    }

    fn from_value(name: &str, value: &Value) -> Result<Data> {
        match value {
            Value::Bool(b) => Ok(Data::Bool(Lane::Scalar(*b))),
            Value::Float32(_) | Value::Float64(_) => {
                Ok(Data::Float(Lane::Scalar(value.as_f64().unwrap_or(f64::NAN))))
            }
            Value::Array(_) => Err(Error::TypeMismatch(format!(
                "variable '{name}' is a multidimensional item"
            ))),
            _ => value.as_i64().map(|v| Data::Int(Lane::Scalar(v))).ok_or_else(|| {
                Error::TypeMismatch(format!("variable '{name}' does not fit in int64"))
            }),
        }
    }

    fn into_evaluated(self) -> Evaluated {
        match self {
            Data::Bool(Lane::Scalar(v)) => Evaluated::Scalar(Value::Bool(v)),
            Data::Int(Lane::Scalar(v)) => Evaluated::Scalar(Value::Int64(v)),
            Data::Float(Lane::Scalar(v)) => Evaluated::Scalar(Value::Float64(v)),
            Data::Bool(Lane::Vector(v)) => Evaluated::Array(Array::from_vec(v)),
            Data::Int(Lane::Vector(v)) => Evaluated::Array(Array::from_vec(v)),
            Data::Float(Lane::Vector(v)) => Evaluated::Array(Array::from_vec(v)),
        }
    }
}

fn widen(lane: std::result::Result<Lane<i64>, Lane<f64>>) -> Lane<f64> {
    match lane {
        Ok(ints) => ints.map(|v| v as f64),
        Err(floats) => floats,
    }
}

fn int_mod(a: i64, b: i64) -> Result<i64> {
    if b == 0 {
        return Err(Error::Expression("integer modulo by zero".into()));
    }
    let r = a.wrapping_rem(b);
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn int_pow(base: i64, exp: i64) -> Result<i64> {
    let exp = u32::try_from(exp).map_err(|_| {
        Error::Expression("integers to negative integer powers are not allowed".into())
    })?;
    Ok(base.wrapping_pow(exp))
}

fn compare(op: BinaryOp, a: Data, b: Data) -> Result<Data> {
    fn test<T: PartialOrd>(op: BinaryOp) -> impl Fn(T, T) -> bool {
        move |x, y| match op {
            BinaryOp::Lt => x < y,
            BinaryOp::Le => x <= y,
            BinaryOp::Gt => x > y,
            BinaryOp::Ge => x >= y,
            BinaryOp::Eq => x == y,
            _ => x != y,
        }
    }
    Ok(Data::Bool(match Data::numeric_pair(a, b) {
        Pair::Int(x, y) => zip(x, y, test::<i64>(op))?,
        Pair::Float(x, y) => zip(x, y, test::<f64>(op))?,
    }))
}

fn binary(op: BinaryOp, a: Data, b: Data) -> Result<Data> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let what = if op == BinaryOp::And { "'&'" } else { "'|'" };
            let (x, y) = (a.into_bool(what)?, b.into_bool(what)?);
            Ok(Data::Bool(if op == BinaryOp::And {
                zip(x, y, |p, q| p & q)?
            } else {
                zip(x, y, |p, q| p | q)?
            }))
        }
        BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Eq
        | BinaryOp::Ne => compare(op, a, b),
        BinaryOp::Div => Ok(Data::Float(zip(a.into_float(), b.into_float(), |x, y| x / y)?)),
        _ => Ok(match Data::numeric_pair(a, b) {
            Pair::Int(x, y) => Data::Int(match op {
                BinaryOp::Add => zip(x, y, i64::wrapping_add)?,
                BinaryOp::Sub => zip(x, y, i64::wrapping_sub)?,
                BinaryOp::Mul => zip(x, y, i64::wrapping_mul)?,
                BinaryOp::Mod => try_zip(x, y, int_mod)?,
                _ => try_zip(x, y, int_pow)?,
            }),
            Pair::Float(x, y) => Data::Float(match op {
                BinaryOp::Add => zip(x, y, |p, q| p + q)?,
                BinaryOp::Sub => zip(x, y, |p, q| p - q)?,
                BinaryOp::Mul => zip(x, y, |p, q| p * q)?,
                BinaryOp::Mod => zip(x, y, float_mod)?,
                _ => zip(x, y, f64::powf)?,
            }),
        }),
    }
}

fn choose<T: Copy>(cond: &Lane<bool>, a: Lane<T>, b: Lane<T>) -> Result<Lane<T>> {
    let lens: Vec<usize> = [cond.len(), a.len(), b.len()].into_iter().flatten().collect();
    let Some(&n) = lens.first() else {
        return Ok(Lane::Scalar(if cond.at(0) { a.at(0) } else { b.at(0) }));
    };
    if let Some(&bad) = lens.iter().find(|&&l| l != n) {
        return Err(Error::LengthMismatch {
            expected: n,
            actual: bad,
        });
    }
    Ok(Lane::Vector(
        (0..n)
            .map(|i| if cond.at(i) { a.at(i) } else { b.at(i) })
            .collect(),
    ))
}

fn call(func: Func, mut args: Vec<Data>) -> Result<Data> {
    if func == Func::Where {
        let b = args.pop();
        let a = args.pop();
        let cond = args.pop();
        let (Some(cond), Some(a), Some(b)) = (cond, a, b) else {
            return Err(Error::Expression("where() takes 3 arguments".into()));
        };
        let cond = cond.into_bool("where() condition")?;
        return Ok(match (a, b) {
            (Data::Bool(x), Data::Bool(y)) => Data::Bool(choose(&cond, x, y)?),
            (a, b) => match Data::numeric_pair(a, b) {
                Pair::Int(x, y) => Data::Int(choose(&cond, x, y)?),
                Pair::Float(x, y) => Data::Float(choose(&cond, x, y)?),
            },
        });
    }
    let arg = args
        .pop()
        .ok_or_else(|| Error::Expression("missing function argument".into()))?;
    if func == Func::Abs {
        return Ok(match arg.into_int() {
            Ok(ints) => Data::Int(ints.map(i64::wrapping_abs)),
            Err(floats) => Data::Float(floats.map(f64::abs)),
        });
    }
    let f: fn(f64) -> f64 = match func {
        Func::Sqrt => f64::sqrt,
        Func::Exp => f64::exp,
        Func::Log => f64::ln,
        Func::Sin => f64::sin,
        Func::Cos => f64::cos,
        _ => f64::tan,
    };
    Ok(Data::Float(arg.into_float().map(f)))
}

fn eval_node(expr: &Expr, bindings: &Bindings) -> Result<Data> {
    match expr {
        Expr::Literal(Literal::Bool(v)) => Ok(Data::Bool(Lane::Scalar(*v))),
        Expr::Literal(Literal::Int(v)) => Ok(Data::Int(Lane::Scalar(*v))),
        Expr::Literal(Literal::Float(v)) => Ok(Data::Float(Lane::Scalar(*v))),
        Expr::Var(name) => match bindings.get(name) {
            Some(Binding::Array(a)) => Data::from_array(name, a),
            Some(Binding::Scalar(v)) => Data::from_value(name, v),
            None => Err(Error::UnknownVariable(name.clone())),
        },
        Expr::Unary(UnaryOp::Neg, inner) => match eval_node(inner, bindings)? {
            Data::Int(l) => Ok(Data::Int(l.map(i64::wrapping_neg))),
            Data::Float(l) => Ok(Data::Float(l.map(|v| -v))),
            Data::Bool(_) => Err(Error::TypeMismatch("cannot negate a bool operand".into())),
        },
        Expr::Unary(UnaryOp::Not, inner) => {
            let l = eval_node(inner, bindings)?.into_bool("'~'")?;
            Ok(Data::Bool(l.map(|v| !v)))
        }
        Expr::Binary(op, l, r) => {
            let a = eval_node(l, bindings)?;
            let b = eval_node(r, bindings)?;
            binary(*op, a, b)
        }
        Expr::Call(func, args) => {
            let args = args
                .iter()
                .map(|a| eval_node(a, bindings))
                .collect::<Result<Vec<_>>>()?;
            call(*func, args)
        }
    }
}

/// Evaluate `expr` against `bindings`.
///
/// The result is a scalar when no array operand is involved.
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<Evaluated> {
    Ok(eval_node(expr, bindings)?.into_evaluated())
}

/// Parse `src` and evaluate it against `bindings`.
pub fn evaluate_str(src: &str, bindings: &Bindings) -> Result<Evaluated> {
    evaluate(&parse(src)?, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, Binding)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn ints(values: &[i64]) -> Binding {
        Binding::Array(Array::from_slice(values))
    }

    #[test]
    fn precedence_and_associativity() {
        let e = parse("1 + 2 * 3 ** 2 ** 0").unwrap();
        let r = evaluate(&e, &Bindings::new()).unwrap();
        assert_eq!(r, Evaluated::Scalar(Value::Int64(7)));

        let r = evaluate_str("-2 ** 2", &Bindings::new()).unwrap();
        assert_eq!(r, Evaluated::Scalar(Value::Int64(-4)));
    }

    #[test]
    fn comparisons_bind_tighter_than_logic() {
        let b = vars(&[("a", ints(&[1, 2, 3, 4])), ("b", ints(&[4, 3, 2, 1]))]);
        let r = evaluate_str("a > 1 & b > 1", &b).unwrap();
        assert_eq!(
            r,
            Evaluated::Array(Array::from_vec(vec![false, true, true, false]))
        );
    }

    #[test]
    fn integer_and_float_semantics() {
        let b = vars(&[("a", ints(&[-7, 7])), ("x", Binding::Scalar(Value::Int32(2)))]);
        let r = evaluate_str("a % 3", &b).unwrap();
        assert_eq!(r, Evaluated::Array(Array::from_vec(vec![2i64, 1])));
        let r = evaluate_str("a / x", &b).unwrap();
        assert_eq!(r, Evaluated::Array(Array::from_vec(vec![-3.5f64, 3.5])));
        assert!(evaluate_str("a ** -1", &b).is_err());
    }

    #[test]
    fn where_and_functions() {
        let b = vars(&[("a", ints(&[1, -2, 3]))]);
        let r = evaluate_str("where(a > 0, a, 0)", &b).unwrap();
        assert_eq!(r, Evaluated::Array(Array::from_vec(vec![1i64, 0, 3])));
        let r = evaluate_str("abs(a)", &b).unwrap();
        assert_eq!(r, Evaluated::Array(Array::from_vec(vec![1i64, 2, 3])));
        let r = evaluate_str("sqrt(4)", &b).unwrap();
        assert_eq!(r, Evaluated::Scalar(Value::Float64(2.0)));
    }

    #[test]
    fn errors_are_classified() {
        let b = vars(&[("a", ints(&[1]))]);
        assert_eq!(evaluate_str("a +", &b).unwrap_err().code(), "EXPRESSION_ERROR");
        assert_eq!(evaluate_str("a + zz", &b).unwrap_err().code(), "UNKNOWN_VARIABLE");
        assert_eq!(evaluate_str("sum(a)", &b).unwrap_err().code(), "EXPRESSION_ERROR");
        assert_eq!(evaluate_str("~a", &b).unwrap_err().code(), "TYPE_MISMATCH");

        let u = vars(&[("u", Binding::Array(Array::from_vec(vec![1u64])))]);
        assert_eq!(evaluate_str("u + 1", &u).unwrap_err().code(), "TYPE_MISMATCH");
    }

    #[test]
    fn variables_in_first_appearance_order() {
        let e = parse("b * a + b - sqrt(c)").unwrap();
        assert_eq!(e.variables(), vec!["b", "a", "c"]);
    }
}

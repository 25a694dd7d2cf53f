//! Formula parsing and evaluation for derived parameters
//!
//! Formulas are ordinary arithmetic over numbers, functions and parameter
//! references. A reference is either `pN`, the parameter with global index
//! `N`, or a full name in braces such as `{gaussian(1).sigma}`.
//!
//! ```
//! use specfit_rs::parameters::expression::Expression;
//! use std::collections::HashMap;
//!
//! let expr = Expression::parse("2 * {gaussian(1).sigma} + p3").unwrap();
//! assert_eq!(expr.variables(), vec!["gaussian(1).sigma".to_string(), "p3".to_string()]);
//!
//! let mut values = HashMap::new();
//! values.insert("gaussian(1).sigma".to_string(), 1.5);
//! values.insert("p3".to_string(), 1.0);
//! assert_eq!(expr.evaluate(&values).unwrap(), 4.0);
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alpha1, alphanumeric1, char, multispace0, one_of},
    combinator::recognize,
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};
use std::collections::HashMap;
use thiserror::Error;

/// Formula parse or evaluation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("cannot parse formula: {message}")]
    ParseError { message: String },

    #[error("formula refers to unknown parameter {name}")]
    UndefinedVariable { name: String },

    #[error("formula divides by zero")]
    DivisionByZero,

    #[error("{message}")]
    InvalidOperation { message: String },

    #[error("formula calls unknown function {name}()")]
    UndefinedFunction { name: String },
}

type ExprResult<T> = Result<T, ExpressionError>;

/// Parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    /// Parameter reference, stored without braces
    Variable(String),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    /// `name(args...)`
    Function(String, Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Supplies parameter values to [`Expression::evaluate`].
pub trait EvaluationContext {
    fn get_variable(&self, name: &str) -> ExprResult<f64>;
}

impl EvaluationContext for HashMap<String, f64> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

impl Expression {
    pub fn parse(input: &str) -> ExprResult<Self> {
        let (rest, expr) = additive(input.trim()).map_err(|e| ExpressionError::ParseError {
            message: format!("'{}': {:?}", input.trim(), e),
        })?;
        if !rest.trim().is_empty() {
            return Err(ExpressionError::ParseError {
                message: format!("'{}' left over after '{}'", rest.trim(), input.trim()),
            });
        }
        Ok(expr)
    }

    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),

            Self::Variable(name) => context.get_variable(name),

            Self::Unary(UnaryOp::Neg, expr) => Ok(-expr.evaluate(context)?),

            Self::Binary(op, a, b) => {
                let (a, b) = (a.evaluate(context)?, b.evaluate(context)?);
                match op {
                    BinaryOp::Add => Ok(a + b),
                    BinaryOp::Sub => Ok(a - b),
                    BinaryOp::Mul => Ok(a * b),
                    BinaryOp::Div if b == 0.0 => Err(ExpressionError::DivisionByZero),
                    BinaryOp::Div => Ok(a / b),
                    BinaryOp::Pow => Ok(a.powf(b)),
                }
            }

            Self::Function(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<f64>>>()?;
                call_function(name, &values)
            }
        }
    }

    /// Referenced parameters, sorted, each once.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.walk(&mut |e: &Expression| {
            if let Self::Variable(name) = e {
                names.push(name.clone());
            }
        });
        names.sort();
        names.dedup();
        names
    }

    fn walk(&self, visit: &mut dyn FnMut(&Expression)) {
        visit(self);
        match self {
            Self::Number(_) | Self::Variable(_) => {}
            Self::Unary(_, inner) => inner.walk(visit),
            Self::Binary(_, a, b) => {
                a.walk(visit);
                b.walk(visit);
            }
            Self::Function(_, args) => args.iter().for_each(|arg| arg.walk(visit)),
        }
    }
}

fn call_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let unary = |f: fn(f64) -> f64| -> ExprResult<f64> {
        if args.len() != 1 {
            return Err(ExpressionError::InvalidOperation {
                message: format!("{}() requires 1 argument, got {}", name, args.len()),
            });
        }
        Ok(f(args[0]))
    };

    match name {
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "exp" => unary(f64::exp),
        "log" | "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "max" | "min" => {
            if args.len() < 2 {
                return Err(ExpressionError::InvalidOperation {
                    message: format!("{}() requires at least 2 arguments, got {}", name, args.len()),
                });
            }
            Ok(if name == "max" {
                args.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
            } else {
                args.iter().fold(f64::INFINITY, |a, &b| a.min(b))
            })
        }
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

// Grammar, loosest binding first:
//   additive       := multiplicative (('+' | '-') multiplicative)*
//   multiplicative := unary (('*' | '/') unary)*
//   unary          := '-' unary | power
//   power          := primary ('^' unary)?
//   primary        := '{' name '}' | ident ('(' args? ')')? | '(' additive ')' | number

fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

/// Identifier: function name or `pN` reference
fn identifier(input: &str) -> IResult<&str, &str> {
    let head = alt((alpha1, tag("_")));
    let tail = many0(alt((alphanumeric1, tag("_"))));
    recognize(pair(head, tail)).parse(input)
}

/// Full parameter name in braces, e.g. `{powerlaw(2).PhoIndex}`
fn braced_name(input: &str) -> IResult<&str, Expression> {
    let parsed: IResult<&str, &str> = delimited(
        char('{'),
        take_while1(|c: char| c != '}' && c != '{'),
        char('}'),
    )
    .parse(input);
    let (input, name) = parsed?;
    Ok((input, Expression::Variable(name.trim().to_string())))
}

fn args_list(input: &str) -> IResult<&str, Vec<Expression>> {
    let (mut input, first) = additive(input)?;
    let mut args = vec![first];
    loop {
        let comma: IResult<&str, char> = preceded(ws, char(',')).parse(input);
        match comma {
            Ok((rest, _)) => {
                let (rest, arg) = additive(rest)?;
                args.push(arg);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, args)),
            Err(e) => return Err(e),
        }
    }
}

/// Function call or bare identifier
fn call_or_variable(input: &str) -> IResult<&str, Expression> {
    let (input, name) = identifier(input)?;
    let open: IResult<&str, char> = preceded(ws, char('(')).parse(input);
    let Ok((after_open, _)) = open else {
        return Ok((input, Expression::Variable(name.to_string())));
    };

    let close: IResult<&str, char> = preceded(ws, char(')')).parse(after_open);
    if let Ok((rest, _)) = close {
        return Ok((rest, Expression::Function(name.to_string(), Vec::new())));
    }

    let (rest, args) = args_list(after_open)?;
    let close: IResult<&str, char> = preceded(ws, char(')')).parse(rest);
    let (rest, _) = close?;
    Ok((rest, Expression::Function(name.to_string(), args)))
}

fn number(input: &str) -> IResult<&str, Expression> {
    let parsed: IResult<&str, f64> = double(input);
    parsed.map(|(rest, value)| (rest, Expression::Number(value)))
}

fn parens(input: &str) -> IResult<&str, Expression> {
    delimited(char('('), additive, preceded(ws, char(')'))).parse(input)
}

/// Identifiers are tried before numbers so that names such as `inf` never
/// parse as floating-point literals.
fn primary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = ws(input)?;
    alt((braced_name, call_or_variable, parens, number)).parse(input)
}

fn unary(input: &str) -> IResult<&str, Expression> {
    let neg: IResult<&str, char> = preceded(ws, char('-')).parse(input);
    match neg {
        Ok((rest, _)) => {
            let (rest, expr) = unary(rest)?;
            Ok((rest, Expression::Unary(UnaryOp::Neg, Box::new(expr))))
        }
        Err(_) => power(input),
    }
}

/// `^` is right associative and binds tighter than a leading minus.
fn power(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary(input)?;
    let op: IResult<&str, char> = preceded(ws, char('^')).parse(input);
    match op {
        Ok((rest, _)) => {
            let (rest, exponent) = unary(rest)?;
            Ok((
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

fn multiplicative(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut acc) = unary(input)?;
    loop {
        let op: IResult<&str, char> = preceded(ws, one_of("*/")).parse(input);
        match op {
            Ok((rest, op)) => {
                let (rest, rhs) = unary(rest)?;
                let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
                acc = Expression::Binary(op, Box::new(acc), Box::new(rhs));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, acc)),
            Err(e) => return Err(e),
        }
    }
}

fn additive(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut acc) = multiplicative(input)?;
    loop {
        let op: IResult<&str, char> = preceded(ws, one_of("+-")).parse(input);
        match op {
            Ok((rest, op)) => {
                let (rest, rhs) = multiplicative(rest)?;
                let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
                acc = Expression::Binary(op, Box::new(acc), Box::new(rhs));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, acc)),
            Err(e) => return Err(e),
        }
    }
}

//! Option strings for statistics and engines
//!
//! Plugins are selected and configured with strings of the form
//! `name;opt1=value1,opt2,opt3=value3`. The leading name is optional (the
//! registry default applies); options are checked against the plugin's table
//! of [`OptionSpec`]s.

use log::warn;
use nom::{
    bytes::complete::{take_till, take_while1},
    character::complete::{char, multispace0},
    combinator::{eof, opt},
    multi::separated_list1,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing or validating option strings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionError {
    #[error("Malformed option string '{input}'")]
    Malformed { input: String },

    #[error("Unknown option '{name}' for {owner}")]
    Unknown { owner: String, name: String },

    #[error("Option '{name}' of {owner} requires a value")]
    MissingValue { owner: String, name: String },

    #[error("Invalid value '{value}' for option '{name}': {message}")]
    InvalidValue {
        name: String,
        value: String,
        message: String,
    },
}

/// One entry of a plugin's recognized-options table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub requires_value: bool,
    pub description: &'static str,
}

impl OptionSpec {
    /// An option that may appear bare. A supplied value is passed through to
    /// the plugin, see [`FitOption::flag_value`].
    pub const fn flag(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            requires_value: false,
            description,
        }
    }

    pub const fn valued(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            requires_value: true,
            description,
        }
    }
}

/// Whether unrecognized options are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Strict,
    /// Skip unknown options with a warning
    Permissive,
}

/// A single `name` or `name=value` option.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOption {
    pub name: String,
    pub value: Option<String>,
}

impl FitOption {
    /// Parse the value into `T`.
    pub fn parse_value<T>(&self) -> Result<T, OptionError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.value.as_deref().unwrap_or_default();
        raw.parse::<T>().map_err(|e| OptionError::InvalidValue {
            name: self.name.clone(),
            value: raw.to_string(),
            message: e.to_string(),
        })
    }

    /// A bare flag is on; otherwise the value reads as a boolean
    /// (`true/false`, `yes/no`, `on/off`, `1/0`).
    pub fn flag_value(&self) -> Result<bool, OptionError> {
        let Some(raw) = self.value.as_deref() else {
            return Ok(true);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(OptionError::InvalidValue {
                name: self.name.clone(),
                value: raw.to_string(),
                message: "expected a boolean".to_string(),
            }),
        }
    }
}

/// A parsed option string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionString {
    pub name: Option<String>,
    pub options: Vec<FitOption>,
}

fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !matches!(c, ';' | ',' | '=') && !c.is_whitespace()).parse(input)
}

fn option(input: &str) -> IResult<&str, FitOption> {
    let (input, name) = delimited(ws, token, ws).parse(input)?;
    let value: IResult<&str, Option<&str>> =
        opt(preceded(char('='), delimited(ws, token, ws))).parse(input);
    let (input, value) = value?;
    Ok((
        input,
        FitOption {
            name: name.to_string(),
            value: value.map(str::to_string),
        },
    ))
}

fn option_list(input: &str) -> IResult<&str, Vec<FitOption>> {
    let (input, options) = separated_list1(char(','), option).parse(input)?;
    let end: IResult<&str, &str> = eof(input);
    let (input, _) = end?;
    Ok((input, options))
}

impl OptionString {
    /// Parse `name;opt1=v1,opt2`.
    ///
    /// ```
    /// use specfit_rs::fit::options::OptionString;
    ///
    /// let parsed = OptionString::parse("chi;weight=model, quiet").unwrap();
    /// assert_eq!(parsed.name.as_deref(), Some("chi"));
    /// assert_eq!(parsed.options.len(), 2);
    /// assert_eq!(parsed.options[0].value.as_deref(), Some("model"));
    /// assert_eq!(parsed.options[1].value, None);
    ///
    /// // no name: the registry default applies
    /// assert_eq!(OptionString::parse("").unwrap().name, None);
    /// assert_eq!(OptionString::parse(";quiet").unwrap().options.len(), 1);
    /// ```
    pub fn parse(input: &str) -> Result<Self, OptionError> {
        let malformed = || OptionError::Malformed {
            input: input.to_string(),
        };

        let split: IResult<&str, &str> = take_till(|c: char| c == ';').parse(input);
        let (rest, head) = split.map_err(|_| malformed())?;
        let head = head.trim();
        let tail = rest.strip_prefix(';');

        let (name, mut option_text) = if head.is_empty() {
            (None, Vec::new())
        } else if head.contains('=') || head.contains(',') {
            (None, vec![head])
        } else {
            (Some(head.to_string()), Vec::new())
        };
        if let Some(tail) = tail {
            if tail.contains(';') {
                return Err(malformed());
            }
            if !tail.trim().is_empty() {
                option_text.push(tail);
            }
        }

        let mut options = Vec::new();
        for text in option_text {
            let (_, parsed) = option_list(text).map_err(|_| malformed())?;
            options.extend(parsed);
        }
        if let Some(name) = &name {
            if name.contains(char::is_whitespace) {
                return Err(malformed());
            }
        }
        Ok(Self { name, options })
    }
}

/// Check options against a recognized-options table. Returns the accepted
/// options in their original order.
pub fn validate(
    owner: &str,
    table: &[OptionSpec],
    options: &[FitOption],
    mode: ParseMode,
) -> Result<Vec<FitOption>, OptionError> {
    let mut accepted = Vec::with_capacity(options.len());
    for option in options {
        let Some(spec) = table.iter().find(|s| s.name == option.name) else {
            match mode {
                ParseMode::Strict => {
                    return Err(OptionError::Unknown {
                        owner: owner.to_string(),
                        name: option.name.clone(),
                    })
                }
                ParseMode::Permissive => {
                    warn!("Ignoring unknown option '{}' for {}", option.name, owner);
                    continue;
                }
            }
        };
        if spec.requires_value && option.value.is_none() {
            return Err(OptionError::MissingValue {
                owner: owner.to_string(),
                name: option.name.clone(),
            });
        }
        accepted.push(option.clone());
    }
    Ok(accepted)
}

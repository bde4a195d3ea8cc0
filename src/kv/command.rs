//! Command tokenizer.
//!
//! Splits a free-form command line such as `ZADD board 1.5 alice` into typed
//! arguments. Tokens are separated by runs of whitespace and there is no
//! quoting, so a single argument can never contain whitespace.

use crate::error::{DbError, DbResult};
use redis::{RedisWrite, ToRedisArgs};
use std::fmt;

/// One token of a command line, typed by what it parses as.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArg {
    Int(i64),
    Float(f64),
    Str(String),
}

impl CommandArg {
    /// Type a single token: integer first, then float, then string.
    pub fn from_token(token: &str) -> Self {
        if let Ok(v) = token.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = token.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::Str(token.to_string())
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            // Plain decimal, never exponent notation
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl ToRedisArgs for CommandArg {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes());
    }
}

/// Split `text` into typed arguments.
///
/// Blank input fails with [`DbError::EmptyCommand`] before anything reaches
/// the server.
pub fn tokenize(text: &str) -> DbResult<Vec<CommandArg>> {
    let args: Vec<CommandArg> = text.split_whitespace().map(CommandArg::from_token).collect();
    if args.is_empty() {
        return Err(DbError::EmptyCommand);
    }
    Ok(args)
}

/// Build a `redis::Cmd` from tokenized arguments; the first one is the command name.
pub fn to_cmd(args: &[CommandArg]) -> DbResult<redis::Cmd> {
    let (name, rest) = args.split_first().ok_or(DbError::EmptyCommand)?;
    let mut cmd = redis::cmd(&name.to_string());
    for arg in rest {
        cmd.arg(arg);
    }
    Ok(cmd)
}

use std::fmt;

use crate::{KvsError, Result};

/// These are the request "commands" that can be made to a key/value store.
///
/// On the wire a request is a single line of text: `CMD KEY [VALUE]`. `KEY` is one
/// whitespace-delimited token. For `CREATE` and `UPDATE` the value is the rest of the line after
/// the single separator that follows the key, taken verbatim.
///
/// Snapshots written by servers that kept that separator as part of the value hold values with
/// a leading space. They load unchanged, and the space is echoed back by `READ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// insert or overwrite a key/value
    Create {
        /// the key to set
        key: String,
        /// the value to set
        value: String,
    },
    /// get a value from the store
    Read {
        /// the key to search for
        key: String,
    },
    /// insert or overwrite a key/value, identical in effect to `Create`
    Update {
        /// the key to set
        key: String,
        /// the value to set
        value: String,
    },
    /// remove a key/value from the store
    Delete {
        /// the key to remove
        key: String,
    },
}

impl Request {
    /// parses one command line.
    ///
    /// A single trailing line terminator is ignored.
    ///
    /// # Errors
    /// returns [`KvsError::Parsing`] for an unknown command or a missing key
    pub fn parse(line: &str) -> Result<Request> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let (cmd, rest) = next_token(line);
        let (key, rest) = next_token(rest);
        if key.is_empty() {
            return Err(KvsError::Parsing(format!("missing key for command {:?}", cmd)));
        }
        let key = key.to_owned();

        match cmd {
            "CREATE" => Ok(Request::Create { key, value: value_of(rest) }),
            "UPDATE" => Ok(Request::Update { key, value: value_of(rest) }),
            "READ" => Ok(Request::Read { key }),
            "DELETE" => Ok(Request::Delete { key }),
            other => Err(KvsError::Parsing(format!("unknown command {:?}", other))),
        }
    }

    /// the key this request names
    pub fn key(&self) -> &str {
        match self {
            Request::Create { key, .. }
            | Request::Read { key }
            | Request::Update { key, .. }
            | Request::Delete { key } => key,
        }
    }

    /// renders the request as a command line, checking first that it parses back to itself.
    ///
    /// # Errors
    /// - [`KvsError::Parsing`] if the key is empty or contains whitespace
    /// - [`KvsError::LineBreak`] if the value contains a line break
    pub fn to_line(&self) -> Result<String> {
        let key = self.key();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(KvsError::Parsing(format!(
                "key {:?} is not a single whitespace-free token",
                key
            )));
        }
        if let Request::Create { value, .. } | Request::Update { value, .. } = self {
            if value.contains(|c: char| c == '\n' || c == '\r') {
                return Err(KvsError::LineBreak { field: "value" });
            }
        }
        Ok(self.to_string())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Create { key, value } => write!(f, "CREATE {} {}", key, value),
            Request::Read { key } => write!(f, "READ {}", key),
            Request::Update { key, value } => write!(f, "UPDATE {} {}", key, value),
            Request::Delete { key } => write!(f, "DELETE {}", key),
        }
    }
}

/// skips leading whitespace and splits off the next token. The remainder keeps the whitespace
/// that ended the token.
fn next_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => s.split_at(end),
        None => (s, ""),
    }
}

/// drops the one separator between key and value
fn value_of(rest: &str) -> String {
    let mut chars = rest.chars();
    chars.next();
    chars.as_str().to_owned()
}

/// The Response types that can be returned for any [`Request`].
///
/// The `Display` form of a response is the exact result line sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// a `CREATE` was applied
    Created {
        /// the key that was written
        key: String,
    },
    /// an `UPDATE` was applied
    Updated {
        /// the key that was written
        key: String,
    },
    /// the value found by a `READ`
    Read {
        /// the key that was read
        key: String,
        /// its value
        value: String,
    },
    /// a `DELETE` removed the key
    Deleted {
        /// the key that was removed
        key: String,
    },
    /// a `READ` or `DELETE` named a key that doesn't exist
    NotFound {
        /// the missing key
        key: String,
    },
    /// the line could not be parsed as a command
    UnknownCommand,
    /// the command was understood but refused
    Rejected(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Created { key } => write!(f, "SUCCESS: CREATE for {}", key),
            Response::Updated { key } => write!(f, "SUCCESS: UPDATE for {}", key),
            Response::Read { key, value } => write!(f, "READ: {} => {}", key, value),
            Response::Deleted { key } => write!(f, "SUCCESS: DELETE {}", key),
            Response::NotFound { key } => write!(f, "ERROR: Key {} not found", key),
            Response::UnknownCommand => write!(f, "ERROR: Unknown command"),
            Response::Rejected(reason) => write!(f, "ERROR: {}", reason),
        }
    }
}

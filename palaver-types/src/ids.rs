//! Validated protocol identifiers.
//!
//! Room ids, user ids, event ids and room aliases are opaque strings with a
//! leading sigil character and (except for modern event ids) a `:server`
//! part. Parsing rejects malformed input up front so the rest of the engine
//! never has to re-validate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced when parsing a protocol identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The identifier does not start with the expected sigil character.
    #[error("invalid identifier {value:?}: expected leading {sigil:?}")]
    WrongSigil {
        /// The sigil the identifier kind requires.
        sigil: char,
        /// The rejected input.
        value: String,
    },

    /// The identifier is missing its `:server` part.
    #[error("invalid identifier {0:?}: missing server name")]
    MissingServerName(String),

    /// The identifier has an empty local part.
    #[error("invalid identifier {0:?}: empty local part")]
    EmptyLocalPart(String),
}

fn validate(value: &str, sigil: char, requires_server: bool) -> Result<(), IdentifierError> {
    let Some(rest) = value.strip_prefix(sigil) else {
        return Err(IdentifierError::WrongSigil {
            sigil,
            value: value.to_string(),
        });
    };
    if requires_server {
        match rest.split_once(':') {
            Some(("", _)) => return Err(IdentifierError::EmptyLocalPart(value.to_string())),
            Some((_, "")) | None => {
                return Err(IdentifierError::MissingServerName(value.to_string()))
            }
            Some((_, _)) => {}
        }
    } else if rest.is_empty() {
        return Err(IdentifierError::EmptyLocalPart(value.to_string()));
    }
    Ok(())
}

macro_rules! identifier {
    ($(#[$doc:meta])* $name:ident, $sigil:literal, $requires_server:literal) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an identifier.
            pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
                let value = value.into();
                validate(&value, $sigil, $requires_server)?;
                Ok(Self(value))
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The server part, when present.
            pub fn server_name(&self) -> Option<&str> {
                self.0[1..].split_once(':').map(|(_, server)| server)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

identifier!(
    /// A room identifier, e.g. `!abcdef:example.org`.
    RoomId, '!', true
);
identifier!(
    /// A user identifier, e.g. `@alice:example.org`.
    UserId, '@', true
);
identifier!(
    /// An event identifier, e.g. `$opaque` (room v3+) or `$opaque:example.org`.
    EventId, '$', false
);
identifier!(
    /// A room alias, e.g. `#general:example.org`.
    RoomAlias, '#', true
);

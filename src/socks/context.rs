//! Request-scoped context
//!
//! A [`Context`] travels through the resolve, rewrite and authorize steps.
//! Each collaborator receives it by value and hands back a possibly
//! updated copy, so resolvers can leave caching or tracing hints for the
//! rule set and the dialer.

use std::collections::BTreeMap;

/// Request-scoped values shared between pipeline collaborators
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    values: BTreeMap<String, String>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this context with `key` set to `value`
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Look up a value
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Result of the authentication step, opaque to the request engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// Negotiated authentication method
    pub method: u8,
    /// Method-specific values (e.g. the user name)
    pub payload: BTreeMap<String, String>,
}

impl AuthContext {
    /// Create an auth context for the given method
    pub fn new(method: u8) -> Self {
        AuthContext {
            method,
            payload: BTreeMap::new(),
        }
    }
}

//! Redacting wrapper for tokens and other sensitive strings

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value: never printed, wiped from memory on drop.
///
/// Access and refresh tokens travel through `tracing` fields and `Debug`
/// output all over the client; wrapping them here keeps them out of logs.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Callers should only pass it to the wire.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Whether the wrapped string is empty (an unusable token).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare against a plain value without exposing the secret to the caller.
    pub fn matches(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

//! Redacted wrapper for passwords and other sensitive values

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value, redacted in Debug/Display and zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Keep the borrow short and never log it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Read a secret from an environment variable. Unset or empty is `None`.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_redacted() {
        let password = Secret::new(String::from("hunter2"));
        assert_eq!(format!("{password:?}"), "[REDACTED]");
        assert_eq!(password.to_string(), "[REDACTED]");
        assert_eq!(password.expose(), "hunter2");
    }

    #[test]
    fn from_env_ignores_unset_and_empty() {
        // Unique names so parallel tests never collide
        unsafe {
            std::env::set_var("COMMON_SECRET_TEST_SET", "pw");
            std::env::set_var("COMMON_SECRET_TEST_EMPTY", "");
        }
        assert_eq!(
            Secret::from_env("COMMON_SECRET_TEST_SET").unwrap().expose(),
            "pw"
        );
        assert!(Secret::from_env("COMMON_SECRET_TEST_EMPTY").is_none());
        assert!(Secret::from_env("COMMON_SECRET_TEST_UNSET").is_none());
        unsafe {
            std::env::remove_var("COMMON_SECRET_TEST_SET");
            std::env::remove_var("COMMON_SECRET_TEST_EMPTY");
        }
    }

    #[test]
    fn clone_is_independent() {
        let original = Secret::from(String::from("pw"));
        let copy = original.clone();
        drop(original);
        assert_eq!(copy.expose(), "pw");
    }
}

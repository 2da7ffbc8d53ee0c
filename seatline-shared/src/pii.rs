use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for secrets (gateway signatures, API keys) that never shows its value in
/// `Debug`/`Display`, so `tracing` fields and error messages cannot leak it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Persisted and returned as-is; masking only applies to formatting.
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Masked(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_formatting() {
        let secret = Masked("9f86d081884c7d65".to_string());
        assert_eq!(format!("{:?}", secret), "********");
        assert_eq!(secret.to_string(), "********");
        assert_eq!(secret.expose(), "9f86d081884c7d65");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"9f86d081884c7d65\"");
    }
}

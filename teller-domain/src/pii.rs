use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for customer-identifying values (requested credential names).
///
/// Debug and Display render a fixed mask so values cannot leak through log
/// macros; Serialize passes the real value through for the provider call
/// and API responses.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> Masked<T> {
    /// Borrow the real value at the single point it is actually needed
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_never_prints_value() {
        let name = Masked("thandi.n".to_string());
        assert_eq!(format!("{:?}", name), "********");
        assert_eq!(format!("{}", name), "********");
        assert_eq!(name.expose(), "thandi.n");
    }
}

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Identifier of the user whose cache partition is read and written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyOwner);
        }

        for (index, ch) in trimmed.chars().enumerate() {
            if ch == '/' || ch.is_control() || ch.is_whitespace() {
                return Err(ValidationError::OwnerInvalidChar { ch, index });
            }
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for OwnerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_case_of_owner_ids() {
        let owner = OwnerId::parse(" Xk29fQ ").expect("valid owner");
        assert_eq!(owner.as_str(), "Xk29fQ");
    }

    #[test]
    fn rejects_path_separators() {
        let err = OwnerId::parse("users/u1").expect_err("must fail");
        assert_eq!(err, ValidationError::OwnerInvalidChar { ch: '/', index: 5 });
    }
}

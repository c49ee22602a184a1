use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter};

use crate::errors::MappingError;

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl FromStr for Role {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            _ => Err(MappingError {
                role: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_role_display_parses_back() {
        for role in Role::iter() {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn test_unknown_role_is_mapping_error() {
        let err = "moderator".parse::<Role>().unwrap_err();
        assert_eq!(err.role, "moderator");
        assert_eq!(err.to_string(), "Unrecognized message role: moderator");
    }

    #[test]
    fn test_role_deserialize_rejects_unknown() {
        assert_eq!(serde_json::from_str::<Role>("\"tool\"").unwrap(), Role::Tool);
        let err = serde_json::from_str::<Role>("\"function\"").unwrap_err();
        assert!(err.to_string().contains("Unrecognized message role: function"));
    }
}

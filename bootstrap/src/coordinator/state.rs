use serde::{Deserialize, Serialize};

/// What followers see when they ask how the leader's setup went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BeforeSuiteState {
    #[default]
    Pending,
    /// Serialized payload, exactly as the leader produced it
    Passed { payload: String },
    Failed { reason: String },
}

impl BeforeSuiteState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let passed = BeforeSuiteState::Passed {
            payload: "{\"num_nodes\":3}".to_string(),
        };
        let json = serde_json::to_value(&passed).unwrap();
        assert_eq!(json["state"], "passed");
        assert_eq!(json["payload"], "{\"num_nodes\":3}");

        let pending: BeforeSuiteState = serde_json::from_str(r#"{"state":"pending"}"#).unwrap();
        assert!(pending.is_pending());
    }
}

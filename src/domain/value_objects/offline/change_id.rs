use super::DeviceId;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// 変更レコードID。`{device_id}:{uuid}` 形式で端末ごとに名前空間を分ける
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(String);

impl ChangeId {
    pub fn generate(device_id: &DeviceId) -> Self {
        Self(format!("{}:{}", device_id.as_str(), Uuid::new_v4()))
    }

    pub fn new(value: String) -> Result<Self, String> {
        Self::validate(&value)?;
        Ok(Self(value))
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        Self::validate(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ID に埋め込まれた端末IDの部分
    pub fn device_prefix(&self) -> Option<&str> {
        self.0.split_once(':').map(|(device, _)| device)
    }

    fn validate(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Change ID cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ChangeId> for String {
    fn from(id: ChangeId) -> Self {
        id.0
    }
}

impl FromStr for ChangeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_namespaced_by_device() {
        let device = DeviceId::new("device-a".into()).unwrap();
        let first = ChangeId::generate(&device);
        let second = ChangeId::generate(&device);

        assert_ne!(first, second);
        assert_eq!(first.device_prefix(), Some("device-a"));
    }

    #[test]
    fn parses_through_from_str() {
        let id: ChangeId = "device-a:1234".parse().unwrap();
        assert_eq!(id.as_str(), "device-a:1234");
        assert_eq!(id.device_prefix(), Some("device-a"));
        assert!("  ".parse::<ChangeId>().is_err());
        assert!(ChangeId::new(String::new()).is_err());
    }
}

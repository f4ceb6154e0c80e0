use serde::{Deserialize, Serialize};

pub const STATUS_IN_COMPLIANCE: &str = "in-compliance";
pub const STATUS_NOT_IN_COMPLIANCE: &str = "not-in-compliance";

/// Derived compliance verdict embedded in the published document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceInfo {
    pub status: String,
    pub message: String,
}

impl ComplianceInfo {
    pub fn new(in_compliance: bool, message: impl Into<String>) -> Self {
        let status = if in_compliance {
            STATUS_IN_COMPLIANCE
        } else {
            STATUS_NOT_IN_COMPLIANCE
        };
        Self {
            status: status.to_string(),
            message: message.into(),
        }
    }

    pub fn in_compliance(&self) -> bool {
        self.status == STATUS_IN_COMPLIANCE
    }
}

/// Which marketplace and credential the adapter is metering against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CspInfo {
    pub name: String,
    #[serde(rename = "accountOrToken")]
    pub account_or_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

impl CspInfo {
    /// Identity placeholder used before a provider client could be built.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_or_token: "unknown".to_string(),
            expiry: None,
        }
    }
}

/// The published status document. Serialization is stable: equal inputs
/// produce byte-identical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportConfig {
    pub csp: CspInfo,
    pub compliance: ComplianceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl SupportConfig {
    pub fn new(csp: CspInfo, compliance: ComplianceInfo, product: Option<String>) -> Self {
        Self {
            csp,
            compliance,
            product,
        }
    }

    /// Document published when the adapter cannot start at all.
    pub fn startup_failure(csp: CspInfo, error: &anyhow::Error) -> Self {
        Self::new(
            csp,
            ComplianceInfo::new(false, format!("adapter unable to start due to error: {error:#}")),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SupportConfig {
        SupportConfig::new(
            CspInfo {
                name: "aws".to_string(),
                account_or_token: "123456789012".to_string(),
                expiry: Some("2026-09-01T12:00:00Z".to_string()),
            },
            ComplianceInfo::new(true, "all licenses accounted for"),
            Some("v2.8.0".to_string()),
        )
    }

    #[test]
    fn serialization_is_deterministic() {
        let first = serde_json::to_vec(&sample()).unwrap();
        let second = serde_json::to_vec(&sample()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let document = SupportConfig::new(
            CspInfo::unknown("aliyun"),
            ComplianceInfo::new(false, "short 2 licenses"),
            None,
        );
        let raw = serde_json::to_string(&document).unwrap();
        assert!(!raw.contains("product"));
        assert!(!raw.contains("expiry"));
        assert!(raw.contains("\"accountOrToken\":\"unknown\""));
    }

    #[test]
    fn compliance_status_strings() {
        assert_eq!(ComplianceInfo::new(true, "ok").status, STATUS_IN_COMPLIANCE);
        assert_eq!(
            ComplianceInfo::new(false, "nope").status,
            STATUS_NOT_IN_COMPLIANCE
        );
        assert!(ComplianceInfo::new(true, "ok").in_compliance());
        assert!(!ComplianceInfo::new(false, "nope").in_compliance());
    }
}

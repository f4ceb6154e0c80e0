use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

pub const TOKEN_KEY: &str = "consumptionToken";
pub const LICENSE_COUNT_KEY: &str = "entitledLicenses";
pub const EXPIRY_KEY: &str = "expiry";

/// License checkout state as confirmed by the marketplace, round-tripped
/// through the checkout secret between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInfo {
    pub consumption_token: String,
    pub entitled_licenses: u64,
    pub expiry: DateTime<Utc>,
}

impl CheckoutInfo {
    /// State representing no entitlement held.
    pub fn none() -> Self {
        Self {
            consumption_token: String::new(),
            entitled_licenses: 0,
            expiry: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Total decode of the persisted secret bag. Any absent or malformed
    /// field means the bookkeeping cannot be trusted, so the caller starts
    /// over from zero entitlement instead of failing the cycle.
    pub fn from_secret(data: &BTreeMap<String, Vec<u8>>) -> Option<Self> {
        let token = std::str::from_utf8(data.get(TOKEN_KEY)?).ok()?;
        let count = std::str::from_utf8(data.get(LICENSE_COUNT_KEY)?)
            .ok()?
            .parse::<u64>()
            .ok()?;
        let expiry = std::str::from_utf8(data.get(EXPIRY_KEY)?).ok()?;
        let expiry = DateTime::parse_from_rfc3339(expiry).ok()?.with_timezone(&Utc);
        Some(Self {
            consumption_token: token.to_string(),
            entitled_licenses: count,
            expiry,
        })
    }

    /// Encode into the three-field string bag the checkout secret carries.
    pub fn to_secret(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (TOKEN_KEY.to_string(), self.consumption_token.clone()),
            (
                LICENSE_COUNT_KEY.to_string(),
                self.entitled_licenses.to_string(),
            ),
            (
                EXPIRY_KEY.to_string(),
                self.expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_bytes(data: BTreeMap<String, String>) -> BTreeMap<String, Vec<u8>> {
        data.into_iter().map(|(k, v)| (k, v.into_bytes())).collect()
    }

    fn sample() -> CheckoutInfo {
        CheckoutInfo {
            consumption_token: "tok-123".to_string(),
            entitled_licenses: 4,
            expiry: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn secret_round_trip() {
        let info = sample();
        let decoded = CheckoutInfo::from_secret(&as_bytes(info.to_secret())).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn missing_field_yields_none() {
        let mut data = as_bytes(sample().to_secret());
        data.remove(LICENSE_COUNT_KEY);
        assert!(CheckoutInfo::from_secret(&data).is_none());
        assert!(CheckoutInfo::from_secret(&BTreeMap::new()).is_none());
    }

    #[test]
    fn malformed_count_yields_none() {
        let mut data = as_bytes(sample().to_secret());
        data.insert(LICENSE_COUNT_KEY.to_string(), b"not-a-number".to_vec());
        assert!(CheckoutInfo::from_secret(&data).is_none());
    }

    #[test]
    fn malformed_expiry_yields_none() {
        let mut data = as_bytes(sample().to_secret());
        data.insert(EXPIRY_KEY.to_string(), b"tomorrow".to_vec());
        assert!(CheckoutInfo::from_secret(&data).is_none());
    }

    #[test]
    fn non_utf8_token_yields_none() {
        let mut data = as_bytes(sample().to_secret());
        data.insert(TOKEN_KEY.to_string(), vec![0xff, 0xfe]);
        assert!(CheckoutInfo::from_secret(&data).is_none());
    }

    #[test]
    fn none_holds_zero_entitlement() {
        assert_eq!(CheckoutInfo::none().entitled_licenses, 0);
        assert!(CheckoutInfo::none().consumption_token.is_empty());
    }
}

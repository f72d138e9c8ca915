use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrative status of a license key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    Active,
    Inactive,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Inactive => "inactive",
            KeyStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown key status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for KeyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "inactive" => Ok(KeyStatus::Inactive),
            "revoked" => Ok(KeyStatus::Revoked),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A persisted license key.
///
/// Field names match the on-disk layout of `keys.json`:
/// `{key, date, status, hwid?, activatedAt?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: String,
    #[serde(rename = "date", deserialize_with = "deserialize_issued_date")]
    pub issued_date: DateTime<Utc>,
    pub status: KeyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwid: Option<String>,
    #[serde(
        rename = "activatedAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub activated_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Creates an unbound record
    pub fn new(key: impl Into<String>, issued_date: DateTime<Utc>, status: KeyStatus) -> Self {
        Self {
            key: key.into(),
            issued_date,
            status,
            hwid: None,
            activated_at: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.hwid.is_some()
    }

    /// Binds the record to a hardware identifier. Returns false if already bound.
    pub fn bind_hardware(&mut self, hwid: &str, at: DateTime<Utc>) -> bool {
        if self.is_bound() {
            return false;
        }
        self.hwid = Some(hwid.to_string());
        self.activated_at = Some(at);
        true
    }

    /// `hwid` and `activatedAt` are either both set or both absent.
    pub fn binding_is_consistent(&self) -> bool {
        self.hwid.is_some() == self.activated_at.is_some()
    }
}

/// Parses a timestamp the way the admin page historically sent it:
/// either RFC 3339 or a bare `YYYY-MM-DD` date (taken as midnight UTC).
pub fn parse_issued_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub fn deserialize_issued_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_issued_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

pub fn deserialize_optional_issued_date<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_issued_date(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_serializes_with_legacy_field_names() {
        let issued = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut record = KeyRecord::new("Moon-AB12CD34", issued, KeyStatus::Active);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], "Moon-AB12CD34");
        assert_eq!(json["status"], "active");
        assert!(json.get("date").is_some());
        assert!(json.get("hwid").is_none());
        assert!(json.get("activatedAt").is_none());

        assert!(record.bind_hardware("device-1", issued));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["hwid"], "device-1");
        assert!(json.get("activatedAt").is_some());
    }

    #[test]
    fn test_accepts_plain_dates_from_legacy_files() {
        let record: KeyRecord =
            serde_json::from_str(r#"{"key":"Moon-AB12CD34","date":"2024-05-01","status":"inactive"}"#)
                .unwrap();

        assert_eq!(record.status, KeyStatus::Inactive);
        assert_eq!(
            record.issued_date,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert!(!record.is_bound());
    }

    #[test]
    fn test_rejects_unknown_status() {
        let result: Result<KeyRecord, _> =
            serde_json::from_str(r#"{"key":"Moon-AB12CD34","date":"2024-05-01","status":"paused"}"#);
        assert!(result.is_err());
        assert!("paused".parse::<KeyStatus>().is_err());
    }

    #[test]
    fn test_bind_is_append_once() {
        let now = Utc::now();
        let mut record = KeyRecord::new("Moon-AB12CD34", now, KeyStatus::Active);

        assert!(record.bind_hardware("device-1", now));
        assert!(!record.bind_hardware("device-2", now));
        assert_eq!(record.hwid.as_deref(), Some("device-1"));
        assert!(record.binding_is_consistent());
    }
}

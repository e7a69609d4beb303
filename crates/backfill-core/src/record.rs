use crate::error::{BackfillError, Result};
use serde::{Deserialize, Serialize};

/// One element of an input batch: a record, or the reason the element could
/// not be read as one.
pub type Entry = std::result::Result<Record, String>;

/// One account entry.
///
/// Field names on the wire follow the account export format
/// (`account_id`, `account_central_id`, `account_owner`). Absent values are
/// always written back as explicit `null`. An element that names a field
/// twice (`account_id` and `id`) is a duplicate-field error for that element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, rename = "account_id", alias = "id")]
    pub id: Option<String>,
    #[serde(
        default,
        rename = "account_central_id",
        alias = "central_id",
        alias = "centralId"
    )]
    pub central_id: Option<String>,
    #[serde(default, rename = "account_owner", alias = "owner")]
    pub owner: Option<String>,
}

impl Record {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_central_id(mut self, central_id: impl Into<String>) -> Self {
        self.central_id = Some(central_id.into());
        self
    }

    /// The owner, or `InvalidRecord` when it is absent or blank.
    pub fn owner(&self) -> Result<&str> {
        match self.owner.as_deref() {
            Some(owner) if !owner.trim().is_empty() => Ok(owner),
            Some(_) => Err(BackfillError::InvalidRecord(
                "account_owner is blank".to_string(),
            )),
            None => Err(BackfillError::InvalidRecord(
                "account_owner is missing".to_string(),
            )),
        }
    }

    /// Owner for log and diagnostic output, never failing.
    pub fn owner_label(&self) -> &str {
        self.owner.as_deref().unwrap_or("<unknown>")
    }

    pub fn has_id(&self) -> bool {
        present(&self.id)
    }

    pub fn has_central_id(&self) -> bool {
        present(&self.central_id)
    }

    pub fn is_complete(&self) -> bool {
        self.has_id() && self.has_central_id()
    }
}

/// Empty strings count as missing; exports commonly write `""` for unset ids.
fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// The fixed demonstration set: one record per present/absent combination,
/// plus one record that is already complete.
pub fn sample_records() -> Vec<Record> {
    vec![
        Record::new("John Doe").with_id("123456"),
        Record::new("Jane Smith"),
        Record::new("Emily Johnson")
            .with_id("654321")
            .with_central_id("CENTRAL_987"),
        Record::new("Michael Brown").with_central_id("CENTRAL_543"),
        Record::new("Olivia Davis").with_id("345678"),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_export_field_names() {
        let json = r#"{"account_id": null, "account_central_id": "C1", "account_owner": "Jane"}"#;
        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.owner.as_deref(), Some("Jane"));
        assert_eq!(r.id, None);
        assert_eq!(r.central_id.as_deref(), Some("C1"));
    }

    #[test]
    fn deserializes_short_aliases_and_absent_fields() {
        let json = r#"{"owner": "Jane", "centralId": "C1"}"#;
        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.owner.as_deref(), Some("Jane"));
        assert_eq!(r.id, None);
        assert_eq!(r.central_id.as_deref(), Some("C1"));
    }

    #[test]
    fn serializes_absent_fields_as_null() {
        let json = serde_json::to_value(Record::new("Jane")).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj["account_id"].is_null());
        assert!(obj["account_central_id"].is_null());
        assert_eq!(obj["account_owner"], "Jane");
    }

    #[test]
    fn missing_or_blank_owner_is_invalid() {
        let r = Record::default();
        assert!(matches!(r.owner(), Err(BackfillError::InvalidRecord(_))));

        let r = Record::new("   ");
        assert!(r.owner().unwrap_err().to_string().contains("blank"));
    }

    #[test]
    fn empty_string_id_counts_as_missing() {
        let r = Record::new("Jane").with_id("");
        assert!(!r.has_id());
    }

    #[test]
    fn sample_covers_every_combination() {
        let records = sample_records();
        assert_eq!(records.len(), 5);
        assert!(records.iter().any(|r| !r.has_id() && !r.has_central_id()));
        assert!(records.iter().any(|r| !r.has_id() && r.has_central_id()));
        assert!(records.iter().any(|r| r.has_id() && !r.has_central_id()));
        assert!(records.iter().any(Record::is_complete));
    }
}

//! Database identifiers and field/value helpers.

/// Logical SONiC databases used by the REST service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbId {
    /// Application database (APPL_DB) - consumed by orchagent.
    ApplDb,
    /// Counters database (COUNTERS_DB) - CRM resource statistics.
    CountersDb,
    /// Configuration database (CONFIG_DB) - definitional records.
    ConfigDb,
    /// Private cache of the REST service (reset info and status).
    RestapiDb,
}

impl DbId {
    pub fn name(&self) -> &'static str {
        match self {
            DbId::ApplDb => "APPL_DB",
            DbId::CountersDb => "COUNTERS_DB",
            DbId::ConfigDb => "CONFIG_DB",
            DbId::RestapiDb => "RESTAPI_DB",
        }
    }

    /// Redis database index.
    pub fn id(&self) -> i64 {
        match self {
            DbId::ApplDb => 0,
            DbId::CountersDb => 2,
            DbId::ConfigDb => 4,
            DbId::RestapiDb => 7,
        }
    }

    /// Separator between table name and key.
    pub fn separator(&self) -> &'static str {
        match self {
            DbId::ConfigDb => "|",
            _ => ":",
        }
    }

    /// Joins key components with this database's separator.
    pub fn join(&self, parts: &[&str]) -> String {
        parts.join(self.separator())
    }

    /// Full redis key of `key` in `table`. An empty table name addresses a
    /// bare key (used for the reset-info hash).
    pub fn key(&self, table: &str, key: &str) -> String {
        if table.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", table, self.separator(), key)
        }
    }
}

/// Placeholder field written for records that carry no attributes.
pub const NULL_FIELD: &str = "NULL";

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs for a table entry.
pub type FieldValues = Vec<FieldValue>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    fn get_field(&self, field: &str) -> Option<&str>;

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str;

    fn has_field(&self, field: &str) -> bool;

    /// Sets a field, replacing any previous value.
    fn set_field(&mut self, field: &str, value: impl Into<String>);

    /// Order-insensitive comparison of two records.
    fn same_fields(&self, other: &FieldValues) -> bool;
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    fn get_field_or<'a>(&'a self, field: &str, default: &'a str) -> &'a str {
        self.get_field(field).unwrap_or(default)
    }

    fn has_field(&self, field: &str) -> bool {
        self.iter().any(|(f, _)| f == field)
    }

    fn set_field(&mut self, field: &str, value: impl Into<String>) {
        let value = value.into();
        match self.iter_mut().find(|(f, _)| f == field) {
            Some(entry) => entry.1 = value,
            None => self.push((field.to_string(), value)),
        }
    }

    fn same_fields(&self, other: &FieldValues) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(f, v)| other.get_field(f) == Some(v.as_str()))
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}

//! Customer records and the per-run audit timestamp

use chrono::{Local, NaiveDateTime};
use validator::ValidateEmail;

/// Destination table for every strategy.
pub const CUSTOMERS_TABLE: &str = "customers";

/// Destination columns, in bind order.
pub const CUSTOMER_COLUMNS: [&str; 9] = [
    "custom_id",
    "name",
    "email",
    "company",
    "city",
    "country",
    "birthday",
    "created_at",
    "updated_at",
];

/// Parameters bound per inserted row (7 source fields + 2 audit timestamps).
pub const PARAMS_PER_ROW: usize = CUSTOMER_COLUMNS.len();

/// One data line of the input file, read verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub custom_id: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub city: String,
    pub country: String,
    /// `YYYY-MM-DD`, passed through unparsed.
    pub birthday: String,
}

impl Customer {
    pub const FIELD_COUNT: usize = 7;

    /// Builds a record from exactly [`Customer::FIELD_COUNT`] fields.
    pub fn from_fields<I>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut it = fields.into_iter();
        let customer = Self {
            custom_id: it.next()?,
            name: it.next()?,
            email: it.next()?,
            company: it.next()?,
            city: it.next()?,
            country: it.next()?,
            birthday: it.next()?,
        };
        if it.next().is_some() {
            return None;
        }
        Some(customer)
    }

    pub fn has_valid_email(&self) -> bool {
        self.email.validate_email()
    }

    /// Source fields in column order.
    pub fn fields(&self) -> [&str; Customer::FIELD_COUNT] {
        [
            &self.custom_id,
            &self.name,
            &self.email,
            &self.company,
            &self.city,
            &self.country,
            &self.birthday,
        ]
    }
}

/// `created_at`/`updated_at` value, captured once per run and shared by every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStamp {
    at: NaiveDateTime,
    formatted: String,
}

impl AuditStamp {
    pub const FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }

    pub fn at(at: NaiveDateTime) -> Self {
        // Sub-second precision is dropped so the stored value matches the text form.
        let formatted = at.format(Self::FORMAT).to_string();
        let at = NaiveDateTime::parse_from_str(&formatted, Self::FORMAT).unwrap_or(at);
        Self { at, formatted }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.at
    }

    pub fn as_str(&self) -> &str {
        &self.formatted
    }
}

impl std::fmt::Display for AuditStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fields(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    #[test]
    fn from_fields_requires_exactly_seven() {
        assert!(Customer::from_fields(fields(7)).is_some());
        assert!(Customer::from_fields(fields(6)).is_none());
        assert!(Customer::from_fields(fields(8)).is_none());
    }

    #[test]
    fn email_filter() {
        let mut c = Customer::from_fields(fields(7)).unwrap();
        c.email = "jane@example.com".into();
        assert!(c.has_valid_email());
        c.email = "not-an-email".into();
        assert!(!c.has_valid_email());
    }

    #[test]
    fn stamp_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 1, 250)
            .unwrap();
        let stamp = AuditStamp::at(at);
        assert_eq!(stamp.as_str(), "2024-03-09 07:05:01");
        assert_eq!(stamp.timestamp().and_utc().timestamp_subsec_millis(), 0);
    }
}

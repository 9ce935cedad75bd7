//! strftime-style time templates used for subdirectory and file names

use chrono::format::{Fixed, Item, Numeric, StrftimeItems};
use chrono::{DateTime, TimeZone};
use std::fmt;

use crate::error::{Error, Result};

/// Calendar fields a file name template can encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeField {
    const ALL: [TimeField; 6] = [
        TimeField::Year,
        TimeField::Month,
        TimeField::Day,
        TimeField::Hour,
        TimeField::Minute,
        TimeField::Second,
    ];

    fn of(item: &Item<'_>) -> Option<Self> {
        match item {
            Item::Numeric(Numeric::Year | Numeric::YearMod100, _) => Some(TimeField::Year),
            Item::Numeric(Numeric::Month, _) => Some(TimeField::Month),
            Item::Fixed(Fixed::ShortMonthName | Fixed::LongMonthName) => Some(TimeField::Month),
            Item::Numeric(Numeric::Day, _) => Some(TimeField::Day),
            Item::Numeric(Numeric::Hour, _) => Some(TimeField::Hour),
            Item::Numeric(Numeric::Minute, _) => Some(TimeField::Minute),
            Item::Numeric(Numeric::Second, _) => Some(TimeField::Second),
            _ => None,
        }
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeField::Year => "year",
            TimeField::Month => "month",
            TimeField::Day => "day",
            TimeField::Hour => "hour",
            TimeField::Minute => "minute",
            TimeField::Second => "second",
        };
        f.write_str(name)
    }
}

/// A validated strftime template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTemplate {
    raw: String,
}

impl TimeTemplate {
    /// Parse a template, rejecting format strings chrono cannot render
    pub fn parse(raw: &str) -> Result<Self> {
        if StrftimeItems::new(raw).any(|item| matches!(item, Item::Error)) {
            return Err(Error::config(format!("Invalid time template: {:?}", raw)));
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// The fields this template encodes
    pub fn fields(&self) -> Vec<TimeField> {
        let mut fields = Vec::new();
        for item in StrftimeItems::new(&self.raw) {
            if let Some(field) = TimeField::of(&item) {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// Fail unless year, month, day, hour, minute and second are all present
    pub fn require_full_timestamp(&self) -> Result<()> {
        let present = self.fields();
        let missing: Vec<String> = TimeField::ALL
            .iter()
            .filter(|f| !present.contains(*f))
            .map(|f| f.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::config(format!(
                "Time template {:?} is missing fields: {}",
                self.raw,
                missing.join(", ")
            )))
        }
    }

    /// Render the template at the given instant
    pub fn render<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        at.format(&self.raw).to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Split a literal trailing extension (".log") off a suffix template.
///
/// Returns the template without the extension and the extension with its dot.
/// A tail containing a strftime directive is not treated as an extension.
pub fn split_extension(template: &str) -> (&str, Option<&str>) {
    match template.rfind('.') {
        Some(idx) => {
            let tail = &template[idx + 1..];
            let is_literal = !tail.is_empty()
                && !tail.contains('%')
                && !tail.contains('/')
                && !tail.contains('\\');
            if is_literal {
                (&template[..idx], Some(&template[idx..]))
            } else {
                (template, None)
            }
        }
        None => (template, None),
    }
}

/// Ensure an extension starts with a dot (empty stays empty)
pub fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

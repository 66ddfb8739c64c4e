//! Archive model: published-post counts bucketed by year and month.

use serde::{Serialize, Serializer};

/// One month bucket inside a year entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveMonth {
    /// Month number, 1-12; serialized as a two-digit string
    #[serde(serialize_with = "two_digit_month")]
    pub month: u32,
    pub count: u32,
}

impl ArchiveMonth {
    pub fn new(month: u32, count: u32) -> Self {
        Self { month, count }
    }

    /// Two-digit label, e.g. `"05"`.
    pub fn label(&self) -> String {
        format!("{:02}", self.month)
    }
}

/// One year entry; months are kept most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveYear {
    pub year: i32,
    pub months: Vec<ArchiveMonth>,
}

impl ArchiveYear {
    pub fn new(year: i32, months: Vec<ArchiveMonth>) -> Self {
        Self { year, months }
    }

    /// Total posts across all months of this year.
    pub fn count(&self) -> u32 {
        self.months.iter().map(|m| m.count).sum()
    }
}

fn two_digit_month<S: Serializer>(month: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:02}", month))
}

//! Date-bucketed archive of published posts.
//!
//! Year entries are kept most recent first, and so are the months inside each
//! year. Posts are counted one at a time so the live watcher never rebuilds the
//! whole index.

use chrono::{Datelike, FixedOffset, Offset, Utc};

use crate::models::{ArchiveMonth, ArchiveYear, Dated};

/// Posts dated in or before this year are never counted. Zero dates in the
/// posts table surface as the Unix epoch.
pub const EPOCH_YEAR: i32 = 1970;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIndex {
    years: Vec<ArchiveYear>,
    offset: FixedOffset,
}

impl Default for ArchiveIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveIndex {
    /// Empty index bucketing by UTC year and month.
    pub fn new() -> Self {
        Self::with_offset(Utc.fix())
    }

    /// Empty index bucketing by the local year and month at `offset`.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            years: Vec::new(),
            offset,
        }
    }

    /// Build an index by counting every post once.
    pub fn from_posts<'a, P, I>(offset: FixedOffset, posts: I) -> Self
    where
        P: Dated + 'a,
        I: IntoIterator<Item = &'a P>,
    {
        let mut index = Self::with_offset(offset);
        for post in posts {
            index.add_post(post);
        }
        index
    }

    pub fn years(&self) -> &[ArchiveYear] {
        &self.years
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Count of posts in one bucket, zero if the bucket does not exist.
    pub fn count(&self, year: i32, month: u32) -> u32 {
        self.years
            .iter()
            .find(|entry| entry.year == year)
            .and_then(|entry| entry.months.iter().find(|m| m.month == month))
            .map_or(0, |m| m.count)
    }

    fn bucket<P: Dated + ?Sized>(&self, post: &P) -> Option<(i32, u32)> {
        let local = post.date().with_timezone(&self.offset);
        if local.year() <= EPOCH_YEAR {
            return None;
        }
        Some((local.year(), local.month()))
    }

    /// Count one post.
    ///
    /// Returns `Some(true)` when a year or month bucket was created,
    /// `Some(false)` when only an existing count went up, and `None` for
    /// posts dated at or before the epoch.
    pub fn add_post<P: Dated + ?Sized>(&mut self, post: &P) -> Option<bool> {
        let (year, month) = self.bucket(post)?;

        let Some(i) = self.years.iter().position(|entry| entry.year <= year) else {
            self.years
                .push(ArchiveYear::new(year, vec![ArchiveMonth::new(month, 1)]));
            return Some(true);
        };
        if self.years[i].year < year {
            self.years
                .insert(i, ArchiveYear::new(year, vec![ArchiveMonth::new(month, 1)]));
            return Some(true);
        }

        let months = &mut self.years[i].months;
        match months.iter().position(|m| m.month <= month) {
            Some(j) if months[j].month == month => {
                months[j].count += 1;
                Some(false)
            }
            Some(j) => {
                months.insert(j, ArchiveMonth::new(month, 1));
                Some(true)
            }
            None => {
                months.push(ArchiveMonth::new(month, 1));
                Some(true)
            }
        }
    }

    /// Uncount one post.
    ///
    /// Returns `Some(true)` when a bucket emptied and was dropped (along with
    /// its year if that was the year's last month), `Some(false)` when a count
    /// went down or the post was never counted, and `None` for posts dated at
    /// or before the epoch.
    pub fn remove_post<P: Dated + ?Sized>(&mut self, post: &P) -> Option<bool> {
        let (year, month) = self.bucket(post)?;

        let Some(i) = self.years.iter().position(|entry| entry.year <= year) else {
            return Some(false);
        };
        if self.years[i].year != year {
            return Some(false);
        }

        let months = &mut self.years[i].months;
        let Some(j) = months.iter().position(|m| m.month <= month) else {
            return Some(false);
        };
        if months[j].month != month {
            return Some(false);
        }

        months[j].count -= 1;
        if months[j].count > 0 {
            return Some(false);
        }
        months.remove(j);
        if months.is_empty() {
            self.years.remove(i);
        }
        Some(true)
    }
}

//! Blog options and their change detection.

use std::collections::BTreeMap;

use serde::Serialize;

/// Blog options keyed by `option_name`.
pub type Options = BTreeMap<String, String>;

/// Option names that differ between two loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionsDiff {
    pub changed: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl OptionsDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff_options(previous: &Options, current: &Options) -> OptionsDiff {
    let mut diff = OptionsDiff::default();
    for (key, value) in current {
        match previous.get(key) {
            None => diff.added.push(key.clone()),
            Some(old) if old != value => diff.changed.push(key.clone()),
            Some(_) => {}
        }
    }
    diff.removed = previous
        .keys()
        .filter(|key| !current.contains_key(*key))
        .cloned()
        .collect();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> Options {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_diff_options() {
        let previous = options(&[("twitter", "bacon"), ("pinterest", "bacon"), ("gone", "x")]);
        let current = options(&[("twitter", "ham"), ("pinterest", "bacon"), ("new", "y")]);

        let diff = diff_options(&previous, &current);

        assert_eq!(diff.changed, vec!["twitter"]);
        assert_eq!(diff.added, vec!["new"]);
        assert_eq!(diff.removed, vec!["gone"]);
        assert!(diff_options(&current, &current).is_empty());
    }
}

use std::collections::HashSet;

/// Names a policy turned away, split by the list that rejected them.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Rejected<'a> {
    pub excluded: Vec<&'a str>,
    pub not_included: Vec<&'a str>,
}

/// Decides which environment variables may be written into source files.
///
/// `exclude` always wins. A non-empty `include` turns into an allow-list.
#[derive(Debug, Clone, Default)]
pub struct VariablePolicy {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl VariablePolicy {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: include.iter().cloned().collect(),
            exclude: exclude.iter().cloned().collect(),
        }
    }

    /// Same decision as [`VariablePolicy::is_eligible`] without logging.
    pub fn allows(&self, name: &str) -> bool {
        !self.exclude.contains(name) && (self.include.is_empty() || self.include.contains(name))
    }

    pub fn is_eligible(&self, name: &str) -> bool {
        if self.exclude.contains(name) {
            log::warn!("{name} will not be replaced because it is in the exclude list.");
            return false;
        }
        if !self.include.is_empty() && !self.include.contains(name) {
            log::warn!("{name} will not be replaced because it is not in the include list.");
            return false;
        }
        true
    }

    /// Names that appear in both lists, sorted.
    pub fn conflicts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .exclude
            .intersection(&self.include)
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// Sorts every name in `names` that [`VariablePolicy::allows`] refuses.
    pub fn rejected<'a, I>(&self, names: I) -> Rejected<'a>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut rejected = Rejected::default();
        for name in names {
            if self.exclude.contains(name) {
                rejected.excluded.push(name);
            } else if !self.include.is_empty() && !self.include.contains(name) {
                rejected.not_included.push(name);
            }
        }
        rejected.excluded.sort_unstable();
        rejected.excluded.dedup();
        rejected.not_included.sort_unstable();
        rejected.not_included.dedup();
        rejected
    }

    pub fn include(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_everything_eligible_without_lists() {
        let policy = VariablePolicy::default();
        assert!(policy.is_eligible("API_KEY"));
        assert!(policy.is_eligible("with-hyphen"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let policy = VariablePolicy::new(&names(&["SECRET", "TOKEN"]), &names(&["SECRET"]));
        assert!(!policy.is_eligible("SECRET"));
        assert!(policy.is_eligible("TOKEN"));
        assert!(!policy.allows("SECRET"));
        assert_eq!(policy.conflicts(), vec!["SECRET"]);
    }

    #[test]
    fn test_include_is_an_allow_list() {
        let policy = VariablePolicy::new(&names(&["TOKEN"]), &names(&["OTHER"]));
        assert!(policy.is_eligible("TOKEN"));
        assert!(!policy.is_eligible("HOST"));
        assert!(!policy.is_eligible("OTHER"));
    }

    #[test]
    fn test_rejected_splits_by_list() {
        let policy = VariablePolicy::new(&names(&["TOKEN", "SECRET"]), &names(&["SECRET"]));
        let rejected = policy.rejected(["PATH", "SECRET", "TOKEN", "HOME", "PATH"]);
        assert_eq!(rejected.excluded, vec!["SECRET"]);
        assert_eq!(rejected.not_included, vec!["HOME", "PATH"]);

        let open = VariablePolicy::default();
        assert_eq!(open.rejected(["A", "B"]), Rejected::default());
    }

    #[test]
    fn test_exclude_only() {
        let policy = VariablePolicy::new(&[], &names(&["SECRET"]));
        assert!(!policy.is_eligible("SECRET"));
        assert!(policy.is_eligible("ANYTHING"));
        assert!(policy.conflicts().is_empty());
    }
}

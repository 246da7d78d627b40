use anyhow::Result;
use std::collections::HashSet;

use crate::builders::policy::VariablePolicy;
use crate::core::config::BundleEnvConfig;
use crate::core::error::BundleError;

/// Checks a loaded configuration before a run.
///
/// Non-fatal problems come back as a list of issues; anything that would make
/// the run guess at the user's intent is an error.
pub trait ConfigValidator {
    /// Corrects what can be corrected in place and describes each correction.
    fn normalize(&self, config: &mut BundleEnvConfig) -> Vec<String>;

    fn validate_config(&self, config: &BundleEnvConfig) -> Result<Vec<String>>;
}

pub struct StandardValidator;

impl StandardValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_target_conflicts(&self, config: &BundleEnvConfig) -> Result<()> {
        let directories: HashSet<&str> = config.directories.iter().map(|d| trim_slashes(d)).collect();
        if let Some(both) = config
            .files
            .iter()
            .find(|file| directories.contains(trim_slashes(file)))
        {
            return Err(BundleError::ConflictingTarget(both.clone()).into());
        }
        Ok(())
    }
}

fn trim_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() { path } else { trimmed }
}

impl ConfigValidator for StandardValidator {
    fn normalize(&self, config: &mut BundleEnvConfig) -> Vec<String> {
        let mut issues = Vec::new();
        let mut extensions = Vec::with_capacity(config.extensions.len());

        for extension in config.extensions.drain(..) {
            let corrected = match extension.strip_prefix('.') {
                Some(stripped) => {
                    issues.push(format!(
                        "{extension} should not start with \".\". The \".\" is removed and processing continues."
                    ));
                    stripped.to_string()
                }
                None => extension,
            };
            if corrected.is_empty() {
                issues.push("An empty extension was ignored.".to_string());
            } else if !extensions.contains(&corrected) {
                extensions.push(corrected);
            }
        }

        config.extensions = extensions;
        issues
    }

    fn validate_config(&self, config: &BundleEnvConfig) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        self.check_target_conflicts(config)?;

        let policy = VariablePolicy::new(&config.include, &config.exclude);
        for name in policy.conflicts() {
            issues.push(format!(
                "{name} exists in include as well as exclude list. It will not be replaced."
            ));
        }

        if config.extensions.is_empty() {
            issues.push("No extensions are configured, no file will be processed.".to_string());
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_leading_dot_is_stripped() {
        let mut config = BundleEnvConfig {
            extensions: strings(&[".js", "ts", "js", "."]),
            ..Default::default()
        };
        let issues = StandardValidator::new().normalize(&mut config);
        assert_eq!(config.extensions, strings(&["js", "ts"]));
        assert_eq!(issues.len(), 3);
        assert!(issues[0].starts_with(".js should not start with"));
    }

    #[test]
    fn test_include_exclude_overlap_is_a_warning() {
        let config = BundleEnvConfig {
            include: strings(&["A", "B"]),
            exclude: strings(&["B"]),
            ..Default::default()
        };
        let issues = StandardValidator::new().validate_config(&config).unwrap();
        assert_eq!(
            issues,
            vec!["B exists in include as well as exclude list. It will not be replaced."]
        );
    }

    #[test]
    fn test_same_path_in_files_and_directories_is_fatal() {
        let config = BundleEnvConfig {
            directories: strings(&["functions/"]),
            files: strings(&["functions"]),
            ..Default::default()
        };
        let err = StandardValidator::new().validate_config(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::ConflictingTarget(path)) if path == "functions"
        ));
    }

    #[test]
    fn test_default_config_is_clean() {
        let issues = StandardValidator::new()
            .validate_config(&BundleEnvConfig::default())
            .unwrap();
        assert!(issues.is_empty());
    }
}

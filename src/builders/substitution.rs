use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::collections::BTreeSet;

use crate::builders::environment::Environment;
use crate::builders::policy::VariablePolicy;
use crate::core::config::SubstitutionStrategy;

/// `process.env['NAME']`, `process.env["NAME"]` or `process.env.NAME`.
const REFERENCE_PATTERN: &str =
    r#"\bprocess\.env(?:\['([\w-]+)'\]|\["([\w-]+)"\]|\.([\w-]+))"#;

/// `const|let|var { A, B } = process.env` ending its line.
const DESTRUCTURING_PATTERN: &str =
    r#"(?mR)\b(const|let|var)\s*\{([^{}]*)\}\s*=\s*process\.env[ \t]*;?[ \t]*$"#;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_$][\w$]*$";

/// One reference rewritten in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// What the report shows: the matched reference text, or `{NAME}` for a
    /// destructured binding.
    pub key: String,
    pub name: String,
    /// `None` when the variable is unset.
    pub value: Option<String>,
}

/// The rewritten text plus what was substituted. An empty `substitutions`
/// list means the file must be left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionOutcome {
    pub content: String,
    pub substitutions: Vec<Substitution>,
}

impl SubstitutionOutcome {
    pub fn is_modified(&self) -> bool {
        !self.substitutions.is_empty()
    }
}

/// Rewrites a file's text against an environment snapshot.
///
/// Running a substituter over already rewritten text is not supported:
/// callers restore from backup before running again.
pub trait Substituter {
    fn substitute(
        &self,
        content: &str,
        env: &Environment,
        policy: &VariablePolicy,
    ) -> SubstitutionOutcome;
}

pub fn for_strategy(strategy: SubstitutionStrategy) -> Result<Box<dyn Substituter>> {
    Ok(match strategy {
        SubstitutionStrategy::Inline => Box::new(InlineSubstituter::new()?),
        SubstitutionStrategy::Prepend => Box::new(PrependSubstituter),
    })
}

/// Renders a value as a single-quoted literal, or the bare `undefined` token.
pub fn quote_value(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("'{}'", escape_literal(value)),
        None => "undefined".to_string(),
    }
}

fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn record(substitutions: &mut Vec<Substitution>, key: String, name: &str, value: Option<&str>) {
    if substitutions.iter().any(|s| s.key == key) {
        return;
    }
    substitutions.push(Substitution {
        key,
        name: name.to_string(),
        value: value.map(str::to_string),
    });
}

/// Rewrites each reference in place, then each destructuring of `process.env`.
pub struct InlineSubstituter {
    reference: Regex,
    destructuring: Regex,
    identifier: Regex,
}

impl InlineSubstituter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            reference: Regex::new(REFERENCE_PATTERN).context("Invalid reference pattern")?,
            destructuring: Regex::new(DESTRUCTURING_PATTERN)
                .context("Invalid destructuring pattern")?,
            identifier: Regex::new(IDENTIFIER_PATTERN).context("Invalid identifier pattern")?,
        })
    }

    fn rewrite_references(
        &self,
        content: &str,
        env: &Environment,
        policy: &VariablePolicy,
        substitutions: &mut Vec<Substitution>,
    ) -> String {
        self.reference
            .replace_all(content, |caps: &Captures<'_>| {
                let matched = &caps[0];
                let Some(name) = caps.get(1).or(caps.get(2)).or(caps.get(3)) else {
                    return matched.to_string();
                };
                let name = name.as_str();
                if !policy.is_eligible(name) {
                    return matched.to_string();
                }

                let value = env.get(name);
                if value.is_none() {
                    log::warn!("{name} is not set, {matched} becomes undefined.");
                }
                record(substitutions, matched.to_string(), name, value);
                quote_value(value)
            })
            .into_owned()
    }

    fn rewrite_destructuring(
        &self,
        content: &str,
        env: &Environment,
        policy: &VariablePolicy,
        substitutions: &mut Vec<Substitution>,
    ) -> String {
        self.destructuring
            .replace_all(content, |caps: &Captures<'_>| {
                let keyword = &caps[1];
                let mut lines = Vec::new();
                let mut kept = Vec::new();

                for binding in caps[2].split(',').map(str::trim).filter(|b| !b.is_empty()) {
                    // Renames, defaults and rest elements stay in the destructuring.
                    if !self.identifier.is_match(binding) || !policy.is_eligible(binding) {
                        kept.push(binding);
                        continue;
                    }

                    let value = env.get(binding);
                    if value.is_none() {
                        log::warn!("{binding} is not set, it is bound to undefined.");
                    }
                    lines.push(format!("{keyword} {binding} = {};", quote_value(value)));
                    record(substitutions, format!("{{{binding}}}"), binding, value);
                }

                if lines.is_empty() {
                    return caps[0].to_string();
                }
                if !kept.is_empty() {
                    lines.push(format!("{keyword} {{ {} }} = process.env;", kept.join(", ")));
                }
                lines.join("\n")
            })
            .into_owned()
    }
}

impl Substituter for InlineSubstituter {
    fn substitute(
        &self,
        content: &str,
        env: &Environment,
        policy: &VariablePolicy,
    ) -> SubstitutionOutcome {
        let mut substitutions = Vec::new();
        let content = self.rewrite_references(content, env, policy, &mut substitutions);
        let content = self.rewrite_destructuring(&content, env, policy, &mut substitutions);
        SubstitutionOutcome {
            content,
            substitutions,
        }
    }
}

/// Injects `process.env['NAME'] = 'value';` for every eligible, set variable
/// at the top of the file, below any `#!` line.
pub struct PrependSubstituter;

impl Substituter for PrependSubstituter {
    fn substitute(
        &self,
        content: &str,
        env: &Environment,
        policy: &VariablePolicy,
    ) -> SubstitutionOutcome {
        let candidates: BTreeSet<&str> = env.iter().map(|(name, _)| name).chain(policy.include()).collect();
        let mut substitutions = Vec::new();
        let mut injected = String::new();

        for name in candidates {
            if !policy.allows(name) {
                continue;
            }
            let Some(value) = env.get(name) else {
                log::debug!("{name} is not set and will not be injected.");
                continue;
            };
            injected.push_str(&format!(
                "process.env['{}'] = {};\n",
                escape_literal(name),
                quote_value(Some(value))
            ));
            record(&mut substitutions, name.to_string(), name, Some(value));
        }

        if substitutions.is_empty() {
            return SubstitutionOutcome {
                content: content.to_string(),
                substitutions,
            };
        }

        let (directive, body) = split_interpreter_directive(content);
        let mut rewritten = String::with_capacity(directive.len() + injected.len() + body.len() + 1);
        rewritten.push_str(directive);
        if !directive.is_empty() && !directive.ends_with('\n') {
            rewritten.push('\n');
        }
        rewritten.push_str(&injected);
        rewritten.push_str(body);

        SubstitutionOutcome {
            content: rewritten,
            substitutions,
        }
    }
}

/// Splits a leading `#!` line (with its newline) from the rest of the text.
fn split_interpreter_directive(content: &str) -> (&str, &str) {
    if !content.starts_with("#!") {
        return ("", content);
    }
    match content.find('\n') {
        Some(end) => content.split_at(end + 1),
        None => (content, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs.iter().copied().collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn inline(content: &str, env: &Environment, policy: &VariablePolicy) -> SubstitutionOutcome {
        InlineSubstituter::new().unwrap().substitute(content, env, policy)
    }

    #[test]
    fn test_dot_reference_is_quoted() {
        let outcome = inline(
            "const key = process.env.API_KEY;\n",
            &env(&[("API_KEY", "secret123")]),
            &VariablePolicy::default(),
        );
        assert_eq!(outcome.content, "const key = 'secret123';\n");
        assert_eq!(
            outcome.substitutions,
            vec![Substitution {
                key: "process.env.API_KEY".to_string(),
                name: "API_KEY".to_string(),
                value: Some("secret123".to_string()),
            }]
        );
    }

    #[test]
    fn test_bracket_forms_and_repeated_references() {
        let content = "a(process.env['HOST']);\nb(process.env[\"HOST\"]);\nc(process.env['HOST']);\n";
        let outcome = inline(content, &env(&[("HOST", "example.com")]), &VariablePolicy::default());
        assert_eq!(
            outcome.content,
            "a('example.com');\nb('example.com');\nc('example.com');\n"
        );
        let keys: Vec<&str> = outcome.substitutions.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["process.env['HOST']", "process.env[\"HOST\"]"]);
    }

    #[test]
    fn test_longer_name_is_not_clobbered_by_prefix() {
        let outcome = inline(
            "x = process.env.API + process.env.API_KEY",
            &env(&[("API", "a"), ("API_KEY", "b")]),
            &VariablePolicy::default(),
        );
        assert_eq!(outcome.content, "x = 'a' + 'b'");
    }

    #[test]
    fn test_unset_variable_becomes_undefined() {
        let outcome = inline("f(process.env.MISSING)", &env(&[]), &VariablePolicy::default());
        assert_eq!(outcome.content, "f(undefined)");
        assert_eq!(outcome.substitutions[0].value, None);
        assert!(outcome.is_modified());
    }

    #[test]
    fn test_single_quotes_and_backslashes_are_escaped() {
        let outcome = inline(
            "v = process.env.MSG",
            &env(&[("MSG", r"it's C:\tmp")]),
            &VariablePolicy::default(),
        );
        assert_eq!(outcome.content, r"v = 'it\'s C:\\tmp'");
    }

    #[test]
    fn test_excluded_reference_is_left_alone() {
        let policy = VariablePolicy::new(&[], &names(&["SECRET"]));
        let outcome = inline(
            "a = process.env.SECRET; b = process.env.PUBLIC;",
            &env(&[("SECRET", "s"), ("PUBLIC", "p")]),
            &policy,
        );
        assert_eq!(outcome.content, "a = process.env.SECRET; b = 'p';");
        assert_eq!(outcome.substitutions.len(), 1);
        assert_eq!(outcome.substitutions[0].name, "PUBLIC");
    }

    #[test]
    fn test_only_excluded_references_means_unmodified() {
        let policy = VariablePolicy::new(&[], &names(&["SECRET"]));
        let content = "a = process.env.SECRET;";
        let outcome = inline(content, &env(&[("SECRET", "s")]), &policy);
        assert!(!outcome.is_modified());
        assert_eq!(outcome.content, content);
    }

    #[test]
    fn test_no_references_means_unmodified() {
        let content = "console.log('hello');\nconst env = processEnv.X;\n";
        let outcome = inline(content, &env(&[("X", "1")]), &VariablePolicy::default());
        assert!(!outcome.is_modified());
        assert_eq!(outcome.content, content);
    }

    #[test]
    fn test_destructuring_becomes_one_line_per_name() {
        let outcome = inline(
            "const { TOKEN, HOST } = process.env\nmain(TOKEN, HOST)\n",
            &env(&[("TOKEN", "abc")]),
            &VariablePolicy::default(),
        );
        assert_eq!(
            outcome.content,
            "const TOKEN = 'abc';\nconst HOST = undefined;\nmain(TOKEN, HOST)\n"
        );
        let keys: Vec<&str> = outcome.substitutions.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["{TOKEN}", "{HOST}"]);
    }

    #[test]
    fn test_destructuring_keeps_keyword_and_ineligible_names() {
        let policy = VariablePolicy::new(&[], &names(&["SECRET"]));
        let outcome = inline(
            "let {\n  A,\n  SECRET,\n  B: renamed,\n} = process.env;\n",
            &env(&[("A", "1"), ("SECRET", "2"), ("B", "3")]),
            &policy,
        );
        assert_eq!(
            outcome.content,
            "let A = '1';\nlet { SECRET, B: renamed } = process.env;\n"
        );
    }

    #[test]
    fn test_destructuring_with_no_eligible_names_is_untouched() {
        let policy = VariablePolicy::new(&names(&["OTHER"]), &[]);
        let content = "var { A } = process.env;\n";
        let outcome = inline(content, &env(&[("A", "1")]), &policy);
        assert!(!outcome.is_modified());
        assert_eq!(outcome.content, content);
    }

    #[test]
    fn test_destructuring_crlf_line_endings() {
        let outcome = inline(
            "const { A } = process.env\r\nrun()\r\n",
            &env(&[("A", "1")]),
            &VariablePolicy::default(),
        );
        assert_eq!(outcome.content, "const A = '1';\r\nrun()\r\n");
    }

    #[test]
    fn test_prepend_injects_sorted_assignments() {
        let outcome = PrependSubstituter.substitute(
            "console.log(process.env.B)\n",
            &env(&[("B", "two"), ("A", "o'ne")]),
            &VariablePolicy::default(),
        );
        assert_eq!(
            outcome.content,
            "process.env['A'] = 'o\\'ne';\nprocess.env['B'] = 'two';\nconsole.log(process.env.B)\n"
        );
        assert_eq!(outcome.substitutions.len(), 2);
    }

    #[test]
    fn test_prepend_keeps_interpreter_directive_first() {
        let policy = VariablePolicy::new(&names(&["A", "UNSET"]), &[]);
        let outcome = PrependSubstituter.substitute(
            "#!/usr/bin/env node\nrun()\n",
            &env(&[("A", "1"), ("B", "2")]),
            &policy,
        );
        assert_eq!(
            outcome.content,
            "#!/usr/bin/env node\nprocess.env['A'] = '1';\nrun()\n"
        );
        let names: Vec<&str> = outcome.substitutions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A"]);
    }

    #[test]
    fn test_prepend_directive_without_newline() {
        let outcome = PrependSubstituter.substitute(
            "#!/bin/node",
            &env(&[("A", "1")]),
            &VariablePolicy::default(),
        );
        assert_eq!(outcome.content, "#!/bin/node\nprocess.env['A'] = '1';\n");
    }

    #[test]
    fn test_prepend_with_nothing_eligible_is_unmodified() {
        let policy = VariablePolicy::new(&[], &names(&["A"]));
        let outcome = PrependSubstituter.substitute("x", &env(&[("A", "1")]), &policy);
        assert!(!outcome.is_modified());
        assert_eq!(outcome.content, "x");
    }

    #[test]
    fn test_quote_value() {
        assert_eq!(quote_value(Some("abc")), "'abc'");
        assert_eq!(quote_value(None), "undefined");
    }
}

//! Child process environment.

use std::collections::BTreeMap;

/// Substrings marking a variable as sensitive (matched case-insensitively).
/// Such variables are never forwarded from the parent.
const SENSITIVE_PATTERNS: &[&str] = &[
    "KEY",
    "SECRET",
    "TOKEN",
    "PASSWORD",
    "CREDENTIAL",
    "PRIVATE",
];

/// Variables forwarded from the parent when the environment is scrubbed.
const PASSTHROUGH_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    "TEMP",
    "TMP",
    "SYSTEMROOT",
];

pub fn is_sensitive(key: &str) -> bool {
    let upper = key.to_uppercase();
    SENSITIVE_PATTERNS.iter().any(|p| upper.contains(p))
}

/// Build the complete environment for a sandboxed child.
///
/// With `scrub` set only [`PASSTHROUGH_VARS`] are taken from `parent`,
/// otherwise every parent variable is. Sensitive names are dropped in both
/// cases. Non-interactive defaults come next and `overrides` are applied last,
/// so an explicitly configured variable always wins.
pub fn build_child_env<I>(
    parent: I,
    scrub: bool,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = parent
        .into_iter()
        .filter(|(key, _)| !scrub || PASSTHROUGH_VARS.contains(&key.as_str()))
        .filter(|(key, _)| !is_sensitive(key))
        .collect();

    env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
    env.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());
    env.insert("NO_COLOR".to_string(), "1".to_string());
    env.insert("TERM".to_string(), "dumb".to_string());

    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }

    env
}

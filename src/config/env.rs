// src/config/env.rs

//! Environment composition and `$VAR` expansion for config values.

use crate::errors::{Result, WatchproxyError};

pub type EnvList = Vec<(String, String)>;

/// Split a `KEY=VALUE` entry. The value may itself contain `=`.
pub fn parse_entry(entry: &str) -> Result<(String, String)> {
    let (key, value) = entry.split_once('=').ok_or_else(|| {
        WatchproxyError::ConfigError(format!("env entry '{entry}' is not KEY=VALUE"))
    })?;
    if !is_name(key) {
        return Err(WatchproxyError::ConfigError(format!(
            "env entry '{entry}' has an invalid name"
        )));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Last definition wins.
pub fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
    env.iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Append `entries` to `base`, expanding each value against everything
/// defined before it.
pub fn extend(base: &[(String, String)], entries: &[String]) -> Result<EnvList> {
    let mut env = base.to_vec();
    for entry in entries {
        let (key, value) = parse_entry(entry)?;
        let value = expand(&value, &env);
        env.push((key, value));
    }
    Ok(env)
}

/// Collapse duplicate keys, keeping the last value, in first-seen order.
pub fn dedup(env: &[(String, String)]) -> EnvList {
    let mut out: EnvList = Vec::with_capacity(env.len());
    for (key, value) in env {
        match out.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.clone(),
            None => out.push((key.clone(), value.clone())),
        }
    }
    out
}

/// Replace `$NAME` and `${NAME}` with values from `env`. Unknown names
/// expand to the empty string. Anything that is not a valid reference
/// (`$1`, `${1}`, `$$`, a lone `$`) is kept as written.
pub fn expand(input: &str, env: &[(String, String)]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                if is_name(name) {
                    out.push_str(lookup(env, name).unwrap_or(""));
                    rest = &braced[end + 1..];
                    continue;
                }
            }
        } else {
            let len = name_len(after);
            if len > 0 {
                out.push_str(lookup(env, &after[..len]).unwrap_or(""));
                rest = &after[len..];
                continue;
            }
        }

        out.push('$');
        rest = after;
        // Keep `$$` intact as a unit.
        if let Some(tail) = rest.strip_prefix('$') {
            out.push('$');
            rest = tail;
        }
    }

    out.push_str(rest);
    out
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && name_len(s) == s.len()
}

fn name_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvList {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn expands_plain_and_braced_names() {
        let e = env(&[("HOME", "/home/me"), ("GOOS", "linux")]);
        assert_eq!(expand("$HOME/bin", &e), "/home/me/bin");
        assert_eq!(expand("${GOOS}_amd64", &e), "linux_amd64");
    }

    #[test]
    fn unknown_names_become_empty() {
        assert_eq!(expand("a${MISSING}b$NOPE", &[]), "ab");
    }

    #[test]
    fn non_name_references_are_left_alone() {
        let e = env(&[("X", "1")]);
        assert_eq!(expand("go test ./$1 ${2} $$ $", &e), "go test ./$1 ${2} $$ $");
    }

    #[test]
    fn last_definition_wins() {
        let e = env(&[("A", "first"), ("A", "second")]);
        assert_eq!(expand("$A", &e), "second");
        assert_eq!(dedup(&e), env(&[("A", "second")]));
    }

    #[test]
    fn extend_expands_against_earlier_entries() {
        let base = env(&[("PATH", "/usr/bin")]);
        let out = extend(&base, &["PATH=/opt/bin:$PATH".to_string(), "B=$PATH".to_string()])
            .unwrap();
        assert_eq!(lookup(&out, "PATH"), Some("/opt/bin:/usr/bin"));
        assert_eq!(lookup(&out, "B"), Some("/opt/bin:/usr/bin"));
    }

    #[test]
    fn parse_entry_rejects_malformed() {
        assert!(parse_entry("NOEQUALS").is_err());
        assert!(parse_entry("1BAD=x").is_err());
        assert_eq!(
            parse_entry("URL=a=b").unwrap(),
            ("URL".to_string(), "a=b".to_string())
        );
    }
}

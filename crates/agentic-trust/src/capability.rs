//! Capability strings and wildcard coverage.
//!
//! A capability is an opaque action name. Grants may end in a wildcard:
//!   - `*` covers every capability
//!   - `translate:*` covers `translate` and anything under `translate:`
//!   - `files/*` covers `files` and anything under `files/`

use std::collections::BTreeSet;

/// Does a granted capability cover a requested one?
pub fn covers(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }

    for (suffix, sep) in [(":*", b':'), ("/*", b'/')] {
        if let Some(prefix) = granted.strip_suffix(suffix) {
            if requested == prefix {
                return true;
            }
            if requested.starts_with(prefix) && requested.as_bytes().get(prefix.len()) == Some(&sep)
            {
                return true;
            }
        }
    }

    false
}

/// Does any capability in `granted` cover `requested`?
pub fn set_covers<'a, I>(granted: I, requested: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    granted.into_iter().any(|g| covers(g, requested))
}

/// Required capabilities not covered by the granted set, in input order.
pub fn missing_capabilities(granted: &BTreeSet<String>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|req| !set_covers(granted, req))
        .cloned()
        .collect()
}

/// Collect capability names into a set.
pub fn capability_set<I, S>(caps: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    caps.into_iter().map(Into::into).collect()
}

use crate::error::{ReadError, Result};
use regex::{Regex, RegexBuilder};

/// Selects branch names by glob (`Muon_*`) or by `/regex/flags`.
#[derive(Clone, Debug)]
pub struct NameFilter {
    pattern: String,
    regex: Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let invalid = |source| ReadError::InvalidFilter {
            pattern: pattern.to_string(),
            source,
        };

        let regex = match parse_slashed(pattern) {
            Some((body, flags)) => RegexBuilder::new(body)
                .case_insensitive(flags.contains('i'))
                .multi_line(flags.contains('m'))
                .dot_matches_new_line(flags.contains('s'))
                .ignore_whitespace(flags.contains('x'))
                .build()
                .map_err(invalid)?,
            None => Regex::new(&glob_to_regex(pattern)).map_err(invalid)?,
        };

        Ok(NameFilter {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

fn parse_slashed(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let flags = &rest[end + 1..];
    if flags.chars().all(|c| "imsx".contains(c)) {
        Some((&rest[..end], flags))
    } else {
        None
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    let mut in_class = false;
    for c in glob.chars() {
        match c {
            '*' if !in_class => out.push_str(".*"),
            '?' if !in_class => out.push('.'),
            '[' if !in_class => {
                in_class = true;
                out.push('[');
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '!' if in_class && out.ends_with('[') => out.push('^'),
            _ if in_class => out.push(c),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        let filter = NameFilter::new("Muon_*").unwrap();
        assert!(filter.matches("Muon_Px"));
        assert!(!filter.matches("nMuon"));

        let filter = NameFilter::new("p?.[xy]").unwrap();
        assert!(filter.matches("p4.x"));
        assert!(!filter.matches("p4.z"));
        assert!(!filter.matches("p4x"));
    }

    #[test]
    fn slashed_regex_with_flags() {
        let filter = NameFilter::new("/^muon_p[xy]$/i").unwrap();
        assert!(filter.matches("Muon_Px"));
        assert!(!filter.matches("Muon_Pz"));
    }

    #[test]
    fn bad_regex_is_reported() {
        assert!(matches!(
            NameFilter::new("/(unclosed/"),
            Err(ReadError::InvalidFilter { .. })
        ));
    }
}

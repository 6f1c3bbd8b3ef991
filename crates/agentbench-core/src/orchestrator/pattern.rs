//! Glob-style trigger patterns.
//!
//! `**` matches any run of characters including `/`, `*` matches within one
//! path segment, `?` matches one non-`/` character. Everything else is literal.

use crate::error::{BenchError, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    re: Regex,
}

impl GlobPattern {
    pub fn new(glob: &str) -> Result<Self> {
        let re = Regex::new(&translate(glob)).map_err(|e| BenchError::InvalidSetting {
            key: "patterns".to_string(),
            reason: format!("'{glob}': {e}"),
        })?;
        Ok(Self {
            source: glob.to_string(),
            re,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a path. Leading `./` and Windows separators are normalised first.
    pub fn matches(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let normalized = normalized.strip_prefix("./").unwrap_or(&normalized);
        self.re.is_match(normalized)
    }
}

fn translate(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // `**/` also matches zero directories.
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(glob: &str, path: &str) -> bool {
        GlobPattern::new(glob).unwrap().matches(path)
    }

    #[test]
    fn single_star_stays_in_segment() {
        assert!(m("src/*.js", "src/app.js"));
        assert!(!m("src/*.js", "src/lib/app.js"));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(m("src/**/*.test.js", "src/a/b/c.test.js"));
        assert!(m("src/**/*.test.js", "src/c.test.js"));
        assert!(m("**", "anything/at/all"));
        assert!(m("docs/**", "docs/a/b.md"));
    }

    #[test]
    fn question_mark_is_one_char() {
        assert!(m("file?.md", "file1.md"));
        assert!(!m("file?.md", "file12.md"));
        assert!(!m("a?b", "a/b"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(m("src/(legacy)/*.js", "src/(legacy)/x.js"));
        assert!(!m("a.b", "axb"));
        assert!(m("c++/*.h", "c++/x.h"));
    }

    #[test]
    fn leading_dot_slash_is_ignored() {
        assert!(m("src/*.ts", "./src/main.ts"));
    }

    #[test]
    fn anchored_both_ends() {
        assert!(!m("*.js", "src/app.js"));
        assert!(!m("src/*.js", "src/app.jsx"));
    }
}

//! Allow-list validation for uploaded file names and sub-paths.

use clap::ValueEnum;

/// How uploaded names are confined below a user's directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PathPolicy {
    /// Character allow-list only. `..` inside a name is not rejected, so a
    /// name such as `a/../../x` can resolve outside the user directory.
    Legacy,
    /// Allow-list plus: no `..` component, the joined destination must stay
    /// under the user directory, and no existing component may be a symlink.
    #[default]
    Contained,
}

impl PathPolicy {
    /// Validates a single name (file name or `path` form value) under this policy.
    pub fn accepts(self, candidate: &str) -> bool {
        if !is_valid_name(candidate) {
            return false;
        }
        match self {
            PathPolicy::Legacy => true,
            PathPolicy::Contained => !has_parent_component(candidate),
        }
    }

    pub fn checks_containment(self) -> bool {
        matches!(self, PathPolicy::Contained)
    }
}

/// Checks `candidate` against the upload name grammar `[A-Za-z0-9_.~/-]+`,
/// rejecting empty names and names starting with `.`.
pub fn is_valid_name(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.starts_with('.') {
        return false;
    }
    candidate.chars().all(is_allowed_char)
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '~' | '/' | '-')
}

fn has_parent_component(candidate: &str) -> bool {
    candidate.split('/').any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_dot_prefixed() {
        for name in ["", ".", "..", ".hidden", "../etc/passwd", "./a", ".~"] {
            assert!(!is_valid_name(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn rejects_characters_outside_grammar() {
        for name in [
            "a b",
            "a\\b",
            "a:b",
            "file\0",
            "semi;colon",
            "quote\"",
            "dollar$",
            "naïve.txt",
            "tab\t",
            "new\nline",
            "percent%2e",
        ] {
            assert!(!is_valid_name(name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn accepts_allowed_names() {
        for name in [
            "doc.txt",
            "var.tar.gz",
            "A-Z_0-9~.bin",
            "sub/dir/file",
            "/abs",
            "trailing/",
            "a/../b",
            "a..b",
            "~user",
        ] {
            assert!(is_valid_name(name), "{name:?} should be accepted");
        }
    }

    #[test]
    fn every_allowed_character_passes_alone_after_a_letter() {
        let allowed = ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(['_', '.', '~', '/', '-']);
        for c in allowed {
            let name = format!("x{c}");
            assert!(is_valid_name(&name), "{name:?} should be accepted");
        }
    }

    #[test]
    fn every_other_ascii_character_fails() {
        for byte in 0u8..128 {
            let c = byte as char;
            if is_allowed_char(c) {
                continue;
            }
            let name = format!("x{c}");
            assert!(!is_valid_name(&name), "{name:?} should be rejected");
        }
    }

    #[test]
    fn legacy_policy_keeps_traversal_gap() {
        assert!(PathPolicy::Legacy.accepts("a/../b"));
        assert!(PathPolicy::Legacy.accepts("a/../../etc/passwd"));
        assert!(!PathPolicy::Legacy.accepts("../etc/passwd"));
    }

    #[test]
    fn contained_policy_rejects_parent_components() {
        assert!(!PathPolicy::Contained.accepts("a/../b"));
        assert!(!PathPolicy::Contained.accepts("a/.."));
        assert!(!PathPolicy::Contained.accepts("../../etc/passwd"));
        assert!(PathPolicy::Contained.accepts("a..b/c"));
        assert!(PathPolicy::Contained.accepts("sub/doc.txt"));
    }

    #[test]
    fn default_policy_is_contained() {
        assert_eq!(PathPolicy::default(), PathPolicy::Contained);
        assert!(PathPolicy::Contained.checks_containment());
        assert!(!PathPolicy::Legacy.checks_containment());
    }
}

//! Search-pattern matching for directory enumeration.

/// Matches `name` against a single-segment pattern where `*` stands for any run of
/// characters and `?` for exactly one. Comparison ignores case; `*.*` matches every name.
/// A trailing `.` restricts the match to names without an extension, so `*.` selects
/// exactly the extensionless names.
pub(crate) fn matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern == "*.*" {
        return true;
    }
    if let Some(stem) = pattern.strip_suffix('.') {
        return !name.contains('.') && (stem.is_empty() || matches(stem, name));
    }

    let pattern: Vec<char> = pattern.chars().flat_map(char::to_uppercase).collect();
    let name: Vec<char> = name.chars().flat_map(char::to_uppercase).collect();

    let (mut p, mut n) = (0, 0);
    // position of the last `*` and the name index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    n = absorbed + 1;
                    backtrack = Some((star, n));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(matches("readme.md", "README.MD"));
        assert!(!matches("readme.md", "readme.m"));
        assert!(!matches("readme", "readme.md"));
    }

    #[test]
    fn test_star() {
        assert!(matches("*.txt", "a.txt"));
        assert!(matches("*.txt", ".txt"));
        assert!(!matches("*.txt", "a.txt.bak"));
        assert!(matches("a*b*c", "aXXbYYc"));
        assert!(matches("a*b*c", "abbbc"));
        assert!(!matches("a*b*c", "acb"));
        assert!(matches("log*", "log"));
    }

    #[test]
    fn test_question_mark() {
        assert!(matches("file?.bin", "file1.bin"));
        assert!(!matches("file?.bin", "file.bin"));
        assert!(!matches("file?.bin", "file12.bin"));
    }

    #[test]
    fn test_trailing_dot_means_no_extension() {
        assert!(matches("*.", "Makefile"));
        assert!(!matches("*.", "a.txt"));
        assert!(matches("read*.", "README"));
        assert!(!matches("read*.", "readme.md"));
    }

    #[test]
    fn test_match_all() {
        assert!(matches("*", "anything"));
        assert!(matches("*.*", "no_extension"));
    }
}

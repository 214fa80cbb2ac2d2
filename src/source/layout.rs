//! File naming for downloaded papers

use std::path::{Path, PathBuf};

/// Characters replaced with `_` in file and folder names
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of a sanitized name, in characters
pub const MAX_NAME_CHARS: usize = 200;

/// Name used when nothing survives sanitization
const FALLBACK_NAME: &str = "unnamed";

fn trim_name(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

/// Make `name` safe to use as a single path component.
///
/// Invalid characters become `_`, surrounding whitespace and dots are
/// removed, and the result is capped at [`MAX_NAME_CHARS`]. Applying it
/// twice gives the same result as applying it once.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = trim_name(&replaced);
    let truncated: String = trimmed.chars().take(MAX_NAME_CHARS).collect();
    let result = trim_name(&truncated);

    if result.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        result.to_string()
    }
}

/// Where a downloaded paper and its page images live:
/// `base_dir/<journal>/<title>/<title>.pdf`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperLayout {
    pub journal: String,
    pub title: String,
    pub directory: PathBuf,
    pub pdf_path: PathBuf,
}

impl PaperLayout {
    pub fn new(base_dir: &Path, journal: &str, title: &str) -> Self {
        let journal = sanitize_filename(journal);
        let title = sanitize_filename(title);
        let directory = base_dir.join(&journal).join(&title);
        let pdf_path = directory.join(format!("{}.pdf", title));

        Self {
            journal,
            title,
            directory,
            pdf_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("test", "test")]
    #[case("hello world", "hello world")]
    #[case("深度學習論文", "深度學習論文")]
    #[case("test:file", "test_file")]
    #[case("test<>file", "test__file")]
    #[case("test\"file", "test_file")]
    #[case("test/file", "test_file")]
    #[case("test\\file", "test_file")]
    #[case("a|b?c*d", "a_b_c_d")]
    #[case("  padded  ", "padded")]
    #[case("...dotted...", "dotted")]
    #[case(" . mixed . ", "mixed")]
    fn test_sanitize_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_filename(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("...")]
    #[case(" . . ")]
    #[case("\t\n")]
    fn test_sanitize_empty_becomes_unnamed(#[case] input: &str) {
        assert_eq!(sanitize_filename(input), "unnamed");
    }

    #[test]
    fn test_sanitize_survey_title() {
        let result = sanitize_filename("Deep Learning: A Survey (2024)?");
        assert!(result.contains("Deep Learning"));
        assert!(!result.contains(':'));
        assert!(!result.contains('?'));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_NAME_CHARS);

        let wide = "論".repeat(250);
        assert_eq!(sanitize_filename(&wide).chars().count(), MAX_NAME_CHARS);
    }

    #[rstest]
    #[case(&format!("{} tail", "x".repeat(199)))]
    #[case(&format!("{}.", "y".repeat(199)))]
    #[case("  Title: with <bad> chars?.  ")]
    #[case("unnamed")]
    #[case("")]
    fn test_sanitize_idempotent(#[case] input: &str) {
        let once = sanitize_filename(input);
        assert_eq!(sanitize_filename(&once), once);
        assert!(once.chars().count() <= MAX_NAME_CHARS);
    }

    #[test]
    fn test_paper_layout() {
        let layout = PaperLayout::new(Path::new("/papers"), "Nature: Physics", "On Spin?");
        assert_eq!(layout.journal, "Nature_ Physics");
        assert_eq!(layout.title, "On Spin_");
        assert_eq!(
            layout.directory,
            PathBuf::from("/papers/Nature_ Physics/On Spin_")
        );
        assert_eq!(
            layout.pdf_path,
            PathBuf::from("/papers/Nature_ Physics/On Spin_/On Spin_.pdf")
        );
    }
}

//! Log filename generation: `{prefix_}YYYYMMDD_HHMMSS{_partNNN}.{ext}`.

use chrono::{DateTime, Utc};

/// Strip characters that are invalid or dangerous in filenames: the Windows
/// reserved set, control characters, spaces, and path-traversal dots.
pub fn sanitize_prefix(prefix: &str) -> String {
    let mut out: String = prefix
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | ' '))
        .filter(|c| !c.is_control())
        .collect();
    while out.contains("..") {
        out = out.replace("..", ".");
    }
    // Collapse runs of separators left by removed characters.
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches(['.', '_', '-']).to_string()
}

/// Extensions are reduced to alphanumerics so a hostile extension cannot
/// smuggle separators into the path.
pub fn sanitize_extension(extension: &str) -> String {
    extension.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Build one filename. `part` is the zero-padded rotation suffix; `None`
/// omits it (rotation disabled).
pub fn build_filename(
    prefix: &str,
    when: DateTime<Utc>,
    part: Option<u32>,
    extension: &str,
) -> String {
    let mut name = String::new();
    let clean = sanitize_prefix(prefix);
    if !clean.is_empty() {
        name.push_str(&clean);
        name.push('_');
    }
    name.push_str(&when.format("%Y%m%d_%H%M%S").to_string());
    if let Some(part) = part {
        name.push_str(&format!("_part{part:03}"));
    }
    name.push('.');
    name.push_str(&sanitize_extension(extension));
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 2, 7, 5, 9).unwrap()
    }

    #[test]
    fn plain_name_without_prefix_or_part() {
        assert_eq!(build_filename("", when(), None, "csv"), "20260802_070509.csv");
    }

    #[test]
    fn prefix_and_part_are_joined_with_underscores() {
        assert_eq!(
            build_filename("bench-3", when(), Some(12), "tsv"),
            "bench-3_20260802_070509_part012.tsv"
        );
    }

    #[rstest]
    #[case("run<1>", "run1")]
    #[case("a/b\\c", "abc")]
    #[case("x:y|z?", "xyz")]
    #[case("quo\"ted*", "quoted")]
    #[case("spa ced", "spaced")]
    #[case("..secret", "secret")]
    #[case("../../etc/passwd", "etcpasswd")]
    #[case("trail.", "trail")]
    #[case("__under__", "under")]
    fn prefix_sanitization(#[case] dirty: &str, #[case] clean: &str) {
        assert_eq!(sanitize_prefix(dirty), clean);
    }

    #[test]
    fn hostile_extension_is_reduced_to_alphanumerics() {
        assert_eq!(sanitize_extension("../sh"), "sh");
        assert_eq!(sanitize_extension("c s v"), "csv");
    }

    #[test]
    fn empty_prefix_after_sanitization_is_dropped() {
        assert_eq!(build_filename("///", when(), None, "csv"), "20260802_070509.csv");
    }
}

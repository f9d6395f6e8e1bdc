//! Label normalization for XNAT identifiers.
//!
//! XNAT labels cannot carry spaces or path separators, so names taken from
//! directories and scanner headers are rewritten before use.

use std::sync::LazyLock;

use regex::Regex;

/// Replace spaces with underscores. Idempotent.
pub fn normalize_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Replace the characters Philips scanners put in patient and exam names
/// (`/ , . ^` and space) with underscores. Idempotent.
pub fn normalize_parrec_name(name: &str) -> String {
    static FORBIDDEN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[/,.^ ]").expect("valid regex"));
    FORBIDDEN.replace_all(name, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_become_underscores() {
        assert_eq!(normalize_name("John Doe"), "John_Doe");
        assert_eq!(normalize_name("already_fine"), "already_fine");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["John Doe", "a  b", "", "x_y z"] {
            let once = normalize_name(input);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn parrec_names_lose_scanner_punctuation() {
        assert_eq!(normalize_parrec_name("DOE^JOHN"), "DOE_JOHN");
        assert_eq!(normalize_parrec_name("exam 1/2, v.3"), "exam_1_2__v_3");
        let once = normalize_parrec_name("A.B/C^D");
        assert_eq!(normalize_parrec_name(&once), once);
    }
}

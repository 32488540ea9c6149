//! Sanitization functions for raw ad-library text fields.

use crate::utils::is_missing_marker;

/// List frames the export wraps around single-valued text fields.
const LIST_FRAMES: [&str; 4] = ["['", "']", "[\"", "\"]"];

/// Remove list frames and escaped line breaks from an exported text field.
///
/// The export stores one-element lists such as `['Wählen gehen!\nJetzt']`.
/// Frames are removed wherever they appear, the literal two-character
/// sequence `\n` becomes a space, and blank results become `None`.
pub(crate) fn unframe_text(value: &str) -> Option<String> {
    let mut cleaned = value.to_string();
    for frame in LIST_FRAMES {
        cleaned = cleaned.replace(frame, "");
    }
    let cleaned = cleaned.replace("\\n", " ").trim().to_string();

    if is_missing_marker(&cleaned) {
        None
    } else {
        Some(cleaned)
    }
}

/// `(facebook, instagram)` delivery flags from `publisher_platforms`.
pub(crate) fn platform_flags(publisher_platforms: Option<&str>) -> (bool, bool) {
    match publisher_platforms {
        Some(platforms) => {
            let platforms = platforms.to_ascii_lowercase();
            (platforms.contains("facebook"), platforms.contains("instagram"))
        }
        None => (false, false),
    }
}

/// Platform code: 1 = Facebook only, 2 = Instagram only, 3 = both.
pub(crate) fn platform_code(facebook: bool, instagram: bool) -> Option<i32> {
    match (facebook, instagram) {
        (true, false) => Some(1),
        (false, true) => Some(2),
        (true, true) => Some(3),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unframe_text() {
        assert_eq!(unframe_text("['Jetzt wählen']"), Some("Jetzt wählen".to_string()));
        assert_eq!(unframe_text("[\"Zitat\"]"), Some("Zitat".to_string()));
        assert_eq!(
            unframe_text("['Erste Zeile\\nZweite Zeile']"),
            Some("Erste Zeile Zweite Zeile".to_string())
        );
        assert_eq!(unframe_text("de"), Some("de".to_string()));
    }

    #[test]
    fn test_unframe_text_blank() {
        assert_eq!(unframe_text("[' ']"), None);
        assert_eq!(unframe_text("['']"), None);
        assert_eq!(unframe_text("nan"), None);
    }

    #[test]
    fn test_platform_flags() {
        assert_eq!(platform_flags(Some("['facebook', 'instagram']")), (true, true));
        assert_eq!(platform_flags(Some("facebook")), (true, false));
        assert_eq!(platform_flags(Some("['instagram']")), (false, true));
        assert_eq!(platform_flags(Some("['messenger']")), (false, false));
        assert_eq!(platform_flags(None), (false, false));
    }

    #[test]
    fn test_platform_code() {
        assert_eq!(platform_code(true, false), Some(1));
        assert_eq!(platform_code(false, true), Some(2));
        assert_eq!(platform_code(true, true), Some(3));
        assert_eq!(platform_code(false, false), None);
    }
}

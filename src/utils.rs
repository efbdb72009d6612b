//! Shared utility functions for advinst-setup.
//!
//! Formatting helpers used in log lines and error messages, plus the path
//! joining rule shared by the cache and the provisioner.

use std::borrow::Cow;

/// Renders whole seconds as `1h 1m 1s`, `1m 1s` or `30s`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, _) => format!("{}m {}s", minutes, secs),
        _ => format!("{}h {}m {}s", hours, minutes, secs),
    }
}

/// Renders a byte count in binary units (`1.5 MB`).
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Formats a process exit code.
///
/// Windows tools report failures as HRESULT-style codes (e.g. `0xE001006D`)
/// which come back from the OS as negative `i32`s. Those are shown in hex;
/// ordinary small codes stay decimal.
pub fn format_exit_code(code: i32) -> String {
    if (0..=0xFFFF).contains(&code) {
        code.to_string()
    } else {
        format!("{:#010X}", code as u32)
    }
}

/// Truncates a string to a maximum length, appending "..." if truncated.
///
/// Returns a `Cow<str>` to avoid allocation when no truncation is needed.
/// Cuts on a char boundary.
pub fn truncate(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.len() <= max_len {
        return Cow::Borrowed(s);
    }

    let keep = if max_len <= 3 { max_len } else { max_len - 3 };
    let mut end = keep;
    while !s.is_char_boundary(end) {
        end -= 1;
    }

    if max_len <= 3 {
        Cow::Borrowed(&s[..end])
    } else {
        Cow::Owned(format!("{}...", &s[..end]))
    }
}

/// Joins `segments` onto `root` using the separator style `root` already uses.
///
/// A root containing a backslash (`C:\tools\advinst`) is joined with
/// backslashes regardless of the host, so Windows paths render identically
/// in logs, exports and tests. Any other root uses the host separator.
pub fn join_native(root: &str, segments: &[&str]) -> String {
    let sep = if root.contains('\\') {
        '\\'
    } else {
        std::path::MAIN_SEPARATOR
    };

    let mut joined = root.trim_end_matches(['\\', '/']).to_string();
    for segment in segments {
        joined.push(sep);
        joined.push_str(segment);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_seconds_only() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(59), "59s");
    }

    #[test]
    fn test_format_duration_minutes_and_seconds() {
        assert_eq!(format_duration(60), "1m 0s");
        assert_eq!(format_duration(180), "3m 0s");
        assert_eq!(format_duration(3599), "59m 59s");
    }

    #[test]
    fn test_format_duration_with_hours() {
        assert_eq!(format_duration(3600), "1h 0m 0s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1572864), "1.5 MB");
        assert_eq!(format_bytes(1073741824), "1.0 GB");
    }

    #[test]
    fn test_format_exit_code() {
        assert_eq!(format_exit_code(0), "0");
        assert_eq!(format_exit_code(1603), "1603");
        assert_eq!(format_exit_code(0xE001_006D_u32 as i32), "0xE001006D");
        assert_eq!(format_exit_code(-1), "0xFFFFFFFF");
    }

    #[test]
    fn test_truncate() {
        assert!(matches!(truncate("hello", 10), Cow::Borrowed(_)));
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hello", 3), "hel");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 'é' is two bytes; cutting at byte 2 would split it
        assert_eq!(truncate("héllo wörld", 5), "h...");
    }

    #[test]
    fn test_join_native_windows_root() {
        assert_eq!(
            join_native(r"C:\tools\advinst", &["bin", "x86", "advancedinstaller.com"]),
            r"C:\tools\advinst\bin\x86\advancedinstaller.com"
        );
    }

    #[test]
    fn test_join_native_trailing_separator() {
        assert_eq!(join_native(r"C:\tools\advinst\", &["bin"]), r"C:\tools\advinst\bin");
    }

    #[cfg(unix)]
    #[test]
    fn test_join_native_unix_root() {
        assert_eq!(join_native("/opt/advinst", &["bin", "x86"]), "/opt/advinst/bin/x86");
    }
}

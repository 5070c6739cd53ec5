//! 差分表示

use similar::TextDiff;

/// リモートの現在の内容とレンダリング結果の unified diff
///
/// 内容が同一なら空文字列。
pub fn unified_diff(remote_path: &str, current: &str, rendered: &str) -> String {
    if current == rendered {
        return String::new();
    }
    TextDiff::from_lines(current, rendered)
        .unified_diff()
        .context_radius(3)
        .header(&format!("remote:{}", remote_path), &format!("rendered:{}", remote_path))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_empty() {
        assert!(unified_diff("/etc/a", "x\n", "x\n").is_empty());
    }

    #[test]
    fn test_changed_line() {
        let diff = unified_diff("/etc/a", "listen=1\nrealm=a\n", "listen=1\nrealm=b\n");
        assert!(diff.contains("--- remote:/etc/a"));
        assert!(diff.contains("+++ rendered:/etc/a"));
        assert!(diff.contains("-realm=a"));
        assert!(diff.contains("+realm=b"));
    }

    #[test]
    fn test_new_file_is_all_additions() {
        let diff = unified_diff("/etc/b", "", "one\ntwo\n");
        assert!(diff.contains("+one"));
        assert!(diff.contains("+two"));
        assert!(!diff.lines().any(|l| l.starts_with('-') && !l.starts_with("---")));
    }
}

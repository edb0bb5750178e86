// Keyword heuristics for degraded mode
//
// Used only when every backend is unavailable. The guesses are deliberately
// conservative and read-only wherever possible.

use once_cell::sync::Lazy;
use regex::Regex;

static TOP_N: Lazy<Regex> = Lazy::new(|| Regex::new(r"top\s+(\d+)").expect("top-n pattern must compile"));
static SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(m|mb|g|gb)\b").expect("size pattern must compile"));
static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("quoted-text pattern must compile"));
static FILE_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(\w+)$").expect("extension pattern must compile"));
static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"name\s+([\w\-.]+)").expect("name pattern must compile"));

/// Best-guess command for `goal` without a model.
pub fn fallback_command(goal: &str) -> String {
    let s = goal.trim().to_lowercase();
    let has = |needle: &str| s.contains(needle);
    let any = |needles: &[&str]| needles.iter().any(|n| s.contains(n));

    if any(&["large", "largest", "big", "biggest", "huge"]) && has("file") {
        return large_files(&s);
    }

    if any(&["free space", "how much space"]) {
        return "df -h".into();
    }
    if (has("disk") && has("usage")) || (has("space") && has("used")) {
        return "du -sh * | sort -rh".into();
    }

    if any(&["search", "find"]) && any(&["text", "string", " for "]) {
        // Quotes are taken from the original casing
        return match quoted_term(goal) {
            Some(term) => format!("grep -RIn {} .", shell_words::quote(term)),
            None => "grep -RIn .".into(),
        };
    }

    if has("find") && any(&["file", "name"]) {
        if let Some(ext) = FILE_EXT.captures(&s).and_then(|c| c.get(1)) {
            return format!("find . -type f -iname '*.{}'", ext.as_str());
        }
        if let Some(pattern) = NAME.captures(&s).and_then(|c| c.get(1)) {
            return format!("find . -type f -iname {}", shell_words::quote(pattern.as_str()));
        }
        return "find . -type f -maxdepth 3 -print".into();
    }

    if any(&["process", "running apps"]) {
        return "ps aux | head -30".into();
    }
    if has("open ports") || (has("ports") && has("listen")) {
        return "lsof -i -P | grep LISTEN".into();
    }
    if any(&["ip address", "my ip"]) {
        return "ipconfig getifaddr en0 2>/dev/null || hostname -I 2>/dev/null || curl -s ifconfig.me".into();
    }
    if any(&["system info", "os version"]) {
        return "uname -a && (sw_vers 2>/dev/null || cat /etc/os-release 2>/dev/null || echo 'Unknown OS')"
            .into();
    }

    if has("git status") {
        return "git status".into();
    }
    if has("git") && has("pull") {
        return "git pull --ff-only".into();
    }
    if has("show branches") || (has("git") && has("branch")) {
        return "git branch -vv".into();
    }
    if any(&["git log", "commit history"]) {
        return "git log --oneline -20".into();
    }

    if any(&["list", "show"]) && any(&["files", "dir"]) {
        return "ls -la".into();
    }
    if has("cpu") && any(&["usage", "load"]) {
        return "top -l 1 -n 0 2>/dev/null || uptime".into();
    }
    if any(&["memory", "ram"]) {
        return "free -h 2>/dev/null || vm_stat 2>/dev/null".into();
    }
    if has("network") && any(&["connection", "interface"]) {
        return "ifconfig 2>/dev/null || ip addr show".into();
    }
    if has("docker") && any(&["container", "running"]) {
        return "docker ps".into();
    }
    if has("env") && has("var") {
        return "env | sort | head -50".into();
    }
    if has("count") && any(&["file", "lines"]) {
        return "find . -type f | wc -l".into();
    }
    if any(&["compress", "zip", "tar"]) && !any(&["unzip", "untar"]) {
        return "tar -czvf archive.tar.gz .".into();
    }
    if any(&["extract", "unzip", "untar"]) {
        return "tar -xzvf archive.tar.gz".into();
    }

    "ls -la".into()
}

fn large_files(s: &str) -> String {
    let top = TOP_N
        .captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(20);

    let threshold = SIZE
        .captures(s)
        .and_then(|c| Some((c.get(1)?.as_str().to_string(), c.get(2)?.as_str().to_string())))
        .map(|(qty, unit)| match unit.as_str() {
            "g" | "gb" => format!("+{}G", qty),
            _ => format!("+{}M", qty),
        })
        .unwrap_or_else(|| "+100M".to_string());

    format!(
        "find . -type f -size {} -print0 | xargs -0 ls -lh | sort -k5 -h | tail -n {}",
        threshold, top
    )
}

fn quoted_term(text: &str) -> Option<&str> {
    let caps = QUOTED.captures(text)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_files() {
        assert_eq!(
            fallback_command("find the largest files"),
            "find . -type f -size +100M -print0 | xargs -0 ls -lh | sort -k5 -h | tail -n 20"
        );
        let cmd = fallback_command("show top 5 big files over 2 GB");
        assert!(cmd.contains("-size +2G"));
        assert!(cmd.ends_with("tail -n 5"));
        assert!(fallback_command("huge files above 500mb").contains("+500M"));
    }

    #[test]
    fn test_search_text_quotes_term() {
        assert_eq!(
            fallback_command("search for \"TODO fix\" in code"),
            "grep -RIn 'TODO fix' ."
        );
        assert_eq!(fallback_command("search text everywhere"), "grep -RIn .");
    }

    #[test]
    fn test_find_by_extension_and_name() {
        assert_eq!(fallback_command("find files ending in .rs"), "find . -type f -iname '*.rs'");
        assert_eq!(
            fallback_command("find file with name config.toml please"),
            "find . -type f -iname config.toml"
        );
    }

    #[test]
    fn test_keyword_table() {
        let cases = [
            ("how much free space do I have", "df -h"),
            ("disk usage here", "du -sh * | sort -rh"),
            ("running processes", "ps aux | head -30"),
            ("what are the open ports", "lsof -i -P | grep LISTEN"),
            ("git status", "git status"),
            ("git pull latest", "git pull --ff-only"),
            ("show commit history", "git log --oneline -20"),
            ("list files", "ls -la"),
            ("docker running containers", "docker ps"),
            ("extract the archive", "tar -xzvf archive.tar.gz"),
            ("unzip it", "tar -xzvf archive.tar.gz"),
            ("compress this folder", "tar -czvf archive.tar.gz ."),
        ];
        for (goal, expected) in cases {
            assert_eq!(fallback_command(goal), expected, "{}", goal);
        }
    }

    #[test]
    fn test_unknown_goal_defaults_to_listing() {
        assert_eq!(fallback_command("write me a poem"), "ls -la");
        assert_eq!(fallback_command(""), "ls -la");
    }
}

// # Configuration Store
//
// Line-oriented `KEY=value` file holding the operator's settings.
//
// ## Format
//
// ```text
// # comments and blank lines are preserved
// export DOMAIN=example.com
// ADMIN_PASSWORD="secret 123"
// WG_PRIVATE_KEY=
// ```
//
// The store is read once at startup. Exactly one value (the generated
// WireGuard private key) is ever written back; every other line is kept
// byte-for-byte so the operator's file survives the rewrite.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// One physical line of the store
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    raw: String,
    entry: Option<(String, String)>,
}

impl Line {
    fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            entry: parse_assignment(raw),
        }
    }

    fn assignment(key: &str, value: &str, exported: bool) -> Self {
        let export = if exported { "export " } else { "" };
        Self {
            raw: format!("{}{}={}", export, key, quote_value(value)),
            entry: Some((key.to_string(), value.to_string())),
        }
    }

    fn is_exported(&self) -> bool {
        self.entry.is_some() && self.raw.trim_start().starts_with("export ")
    }
}

/// A `KEY=value` configuration store
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    path: Option<PathBuf>,
    lines: Vec<Line>,
}

impl EnvFile {
    /// Load the store from disk
    ///
    /// A missing file is a precondition failure: the operator must provide
    /// the required keys before the first run.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).await.map_err(|e| {
            Error::precondition(format!(
                "cannot read configuration store {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut store = Self::parse(&content);
        store.path = Some(path);
        tracing::debug!("Loaded configuration store with {} key(s)", store.keys().len());
        Ok(store)
    }

    /// Parse store content that has no backing file
    pub fn parse(content: &str) -> Self {
        Self {
            path: None,
            lines: content.lines().map(Line::parse).collect(),
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a value; the last assignment wins, as in a shell
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .filter_map(|line| line.entry.as_ref())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a value, treating empty (after trimming) as absent
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// All assigned keys in file order (duplicates removed)
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in self.lines.iter().filter_map(|line| line.entry.as_ref()) {
            if !keys.contains(&key.as_str()) {
                keys.push(key.as_str());
            }
        }
        keys
    }

    /// Set a value in memory
    ///
    /// Rewrites the last assignment of `key` in place, keeping its `export`
    /// prefix, or appends a new line.
    pub fn set(&mut self, key: &str, value: &str) {
        let existing = self
            .lines
            .iter()
            .rposition(|line| matches!(&line.entry, Some((k, _)) if k == key));

        match existing {
            Some(index) => {
                let exported = self.lines[index].is_exported();
                self.lines[index] = Line::assignment(key, value, exported);
            }
            None => self.lines.push(Line::assignment(key, value, false)),
        }
    }

    /// Render the store back to text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.raw);
            out.push('\n');
        }
        out
    }

    /// Set a value and write the store back to its file
    pub async fn set_and_persist(&mut self, key: &str, value: &str) -> Result<()> {
        self.set(key, value);
        self.persist().await
    }

    /// Write the store back to its file atomically, owner-only
    ///
    /// The temp file is created fresh with mode 0600, so the secrets in the
    /// store are never readable by anyone else.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            // In-memory store: nothing to write
            return Ok(());
        };

        let mut temp_path = path.to_path_buf();
        temp_path.set_extension("tmp");

        // A leftover temp file keeps its own mode; never reuse it
        match fs::remove_file(&temp_path).await {
            Ok(()) => tracing::debug!("Removed stale temp file {}", temp_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        {
            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options.open(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(self.render().as_bytes()).await?;
            file.flush().await?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!("Configuration store written: {}", path.display());
        Ok(())
    }
}

/// Parse `KEY=value` (optionally `export KEY=value`), ignoring comments
fn parse_assignment(raw: &str) -> Option<(String, String)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some((key.to_string(), unquote(value.trim())))
}

/// Strip quoting and a trailing comment from a raw value
///
/// Quoting follows the shell: `'...'` is literal, `"..."` honours `\"` and
/// `\\`, and a backslash outside quotes escapes the next character. A `#`
/// after unquoted whitespace starts a comment.
fn unquote(raw: &str) -> String {
    let mut value = String::new();
    let mut blank = String::new();
    let mut chars = raw.trim().chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            blank.push(c);
            continue;
        }
        if c == '#' && !blank.is_empty() {
            break;
        }
        value.push_str(&blank);
        blank.clear();

        match c {
            '\'' => value.extend(chars.by_ref().take_while(|&c| c != '\'')),
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' if matches!(chars.peek(), Some(&('"' | '\\' | '$' | '`'))) => {
                            value.extend(chars.next());
                        }
                        c => value.push(c),
                    }
                }
            }
            '\\' => value.extend(chars.next()),
            c => value.push(c),
        }
    }

    value
}

fn quote_value(value: &str) -> String {
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '$' | '`' | '\\'))
    {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
# bastion settings
export DOMAIN=example.com
ADMIN_PASSWORD=\"secret 123\"
DB_PASSWORD='dbpass'
WG_PRIVATE_KEY=
WG_ALLOWED_IPS=10.0.0.0/24 # office
ADMIN_NAME=\"Jane Doe\" # shown in the UI
";

    #[test]
    fn parses_assignments_quotes_and_comments() {
        let store = EnvFile::parse(SAMPLE);

        assert_eq!(store.get("DOMAIN"), Some("example.com"));
        assert_eq!(store.get("ADMIN_PASSWORD"), Some("secret 123"));
        assert_eq!(store.get("DB_PASSWORD"), Some("dbpass"));
        assert_eq!(store.get("WG_ALLOWED_IPS"), Some("10.0.0.0/24"));
        assert_eq!(store.get("ADMIN_NAME"), Some("Jane Doe"));
        assert_eq!(store.get("WG_PRIVATE_KEY"), Some(""));
        assert_eq!(store.get_non_empty("WG_PRIVATE_KEY"), None);
        assert_eq!(store.get("MISSING"), None);
        assert_eq!(store.keys().len(), 6);

        let store =
            EnvFile::parse("DB_PASSWORD=\"dbpass\" # db\nPROXY_IMAGE='jc21/npm:2 #pinned'\n");
        assert_eq!(store.get("DB_PASSWORD"), Some("dbpass"));
        assert_eq!(store.get("PROXY_IMAGE"), Some("jc21/npm:2 #pinned"));
    }

    #[test]
    fn parses_shell_escapes() {
        let store = EnvFile::parse(concat!(
            "A=\"say \\\"hi\\\"\"\n",
            "B='it'\\''s'\n",
            "C=pass#word\n",
            "D=\"  padded  \"\n",
        ));

        assert_eq!(store.get("A"), Some("say \"hi\""));
        assert_eq!(store.get("B"), Some("it's"));
        assert_eq!(store.get("C"), Some("pass#word"));
        assert_eq!(store.get("D"), Some("  padded  "));
    }

    #[test]
    fn last_assignment_wins() {
        let store = EnvFile::parse("DOMAIN=a.com\nDOMAIN=b.com\n");
        assert_eq!(store.get("DOMAIN"), Some("b.com"));
    }

    #[test]
    fn set_rewrites_in_place_and_preserves_other_lines() {
        let mut store = EnvFile::parse(SAMPLE);
        store.set("WG_PRIVATE_KEY", "aGVsbG8gd29ybGQ+/=");

        let rendered = store.render();
        assert!(rendered.starts_with("# bastion settings\nexport DOMAIN=example.com\n"));
        assert!(rendered.contains("\nWG_PRIVATE_KEY=aGVsbG8gd29ybGQ+/=\n"));
        assert!(rendered.contains("WG_ALLOWED_IPS=10.0.0.0/24 # office"));
        assert_eq!(rendered.lines().count(), SAMPLE.lines().count());
    }

    #[test]
    fn set_keeps_export_prefix() {
        let mut store = EnvFile::parse("export WG_PRIVATE_KEY=\nexport DOMAIN=example.com\n");
        store.set("WG_PRIVATE_KEY", "generated-key");

        assert_eq!(
            store.render(),
            "export WG_PRIVATE_KEY=generated-key\nexport DOMAIN=example.com\n"
        );
        assert_eq!(store.get("WG_PRIVATE_KEY"), Some("generated-key"));
    }

    #[test]
    fn quoted_values_survive_a_rewrite() {
        let mut store = EnvFile::parse("DB_PASSWORD=\n");
        store.set("DB_PASSWORD", "it's a \"$ecret\" # not a comment");

        let reparsed = EnvFile::parse(&store.render());
        assert_eq!(
            reparsed.get("DB_PASSWORD"),
            Some("it's a \"$ecret\" # not a comment")
        );
    }

    #[test]
    fn set_appends_unknown_keys_and_quotes_when_needed() {
        let mut store = EnvFile::parse("DOMAIN=example.com\n");
        store.set("ADMIN_NAME", "Jane Doe");

        assert_eq!(store.get("ADMIN_NAME"), Some("Jane Doe"));
        assert!(store.render().ends_with("ADMIN_NAME='Jane Doe'\n"));

        let reparsed = EnvFile::parse(&store.render());
        assert_eq!(reparsed.get("ADMIN_NAME"), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn persist_writes_back_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bastion.env");
        fs::write(&path, SAMPLE).await.unwrap();

        let mut store = EnvFile::load(&path).await.unwrap();
        store
            .set_and_persist("WG_PRIVATE_KEY", "generated-key")
            .await
            .unwrap();

        let reloaded = EnvFile::load(&path).await.unwrap();
        assert_eq!(reloaded.get("WG_PRIVATE_KEY"), Some("generated-key"));
        assert_eq!(reloaded.get("DOMAIN"), Some("example.com"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn persist_replaces_a_stale_temp_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("bastion.env");
        let stale = dir.path().join("bastion.tmp");
        fs::write(&path, SAMPLE).await.unwrap();
        fs::write(&stale, "leftover from a crashed run\n").await.unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut store = EnvFile::load(&path).await.unwrap();
        store
            .set_and_persist("WG_PRIVATE_KEY", "generated-key")
            .await
            .unwrap();

        assert!(!stale.exists());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(!content.contains("leftover"));
        assert!(content.contains("WG_PRIVATE_KEY=generated-key\n"));
    }

    #[tokio::test]
    async fn missing_file_is_a_precondition_failure() {
        let dir = tempdir().unwrap();
        let err = EnvFile::load(dir.path().join("absent.env")).await.unwrap_err();
        assert!(err.is_precondition());
    }
}

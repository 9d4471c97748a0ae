//! Kilnfile.lock persistence
//!
//! The lock record is the only state that outlives a run. It is read at the
//! start of every resolution and, when a pin changes, rewritten through a
//! temporary file in the same directory followed by a rename, so readers
//! never observe a missing or half-written lock.
//!
//! Pin updates edit the `version` and `sha1` scalars of one entry in the
//! existing text. Every other byte of the file is kept as written.

use crate::error::{KilnError, KilnResult};
use crate::release::Stemcell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A pinned release entry; field order is the serialized order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedRelease {
    pub name: String,

    #[serde(default)]
    pub sha1: String,

    pub version: String,
}

/// Persisted pins plus the single global stemcell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnfileLock {
    #[serde(default)]
    pub releases: Vec<LockedRelease>,

    #[serde(rename = "stemcell_criteria", default)]
    pub stemcell: Stemcell,
}

impl KilnfileLock {
    /// The lock path that belongs to a Kilnfile (`<kilnfile>.lock`)
    pub fn path_for(kilnfile: &Path) -> PathBuf {
        let mut path = kilnfile.as_os_str().to_owned();
        path.push(".lock");
        PathBuf::from(path)
    }

    /// Parse a lock record from YAML
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Serialize the full record to YAML
    pub fn to_yaml(&self) -> KilnResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load the lock record from disk
    pub async fn load(path: &Path) -> KilnResult<Self> {
        let content = read_lock(path).await?;
        parse_lock(path, &content)
    }

    /// Replace the version and sha1 pinned for `name` in the lock at `path`.
    ///
    /// The entry is edited in place, keeping the quoting of its values. If the
    /// file is laid out in a way the in-place edit does not understand, the
    /// whole record is serialized again instead.
    pub async fn update_pin(path: &Path, name: &str, version: &str, sha1: &str) -> KilnResult<()> {
        let content = read_lock(path).await?;
        let mut expected = parse_lock(path, &content)?;

        let entry = expected
            .release_mut(name)
            .ok_or_else(|| KilnError::ReleaseNotInLock {
                name: name.to_string(),
                lock: path.to_path_buf(),
            })?;
        entry.version = version.to_string();
        entry.sha1 = sha1.to_string();

        let edited = edit_pin(&content, name, version, sha1)
            .filter(|text| Self::from_yaml(text).ok().as_ref() == Some(&expected));
        let updated = match edited {
            Some(text) => text,
            None => {
                warn!(
                    "Could not edit {} in place, rewriting the whole record",
                    path.display()
                );
                expected.to_yaml()?
            }
        };

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&path, updated.as_bytes()))
            .await
            .map_err(|e| KilnError::Internal(format!("lock writer task failed: {}", e)))?
    }

    /// Find a pinned release by name
    pub fn release_mut(&mut self, name: &str) -> Option<&mut LockedRelease> {
        self.releases.iter_mut().find(|r| r.name == name)
    }

    /// Find a pinned release by name
    pub fn release(&self, name: &str) -> Option<&LockedRelease> {
        self.releases.iter().find(|r| r.name == name)
    }
}

async fn read_lock(path: &Path) -> KilnResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(KilnError::ConfigNotFound(path.to_path_buf()))
        }
        Err(e) => Err(KilnError::io(format!("reading {}", path.display()), e)),
    }
}

fn parse_lock(path: &Path, content: &str) -> KilnResult<KilnfileLock> {
    KilnfileLock::from_yaml(content)
        .map_err(|e| KilnError::config_file(format!("Kilnfile.lock {}", path.display()), e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Plain,
    Single,
    Double,
}

/// A `key: value` line, with the byte range of the value inside the line
struct Field<'a> {
    key: &'a str,
    value: Range<usize>,
    quoting: Quoting,
}

impl Field<'_> {
    fn raw<'l>(&self, line: &'l str) -> &'l str {
        &line[self.value.clone()]
    }

    /// The scalar's string value, or None for escapes this edit does not handle
    fn text(&self, line: &str) -> Option<String> {
        let raw = self.raw(line);
        match self.quoting {
            Quoting::Plain => Some(raw.to_string()),
            Quoting::Single => Some(raw[1..raw.len() - 1].replace("''", "'")),
            Quoting::Double => {
                let inner = &raw[1..raw.len() - 1];
                (!inner.contains('\\')).then(|| inner.to_string())
            }
        }
    }
}

/// One `- ` item of the `releases:` sequence
struct Entry {
    lines: Range<usize>,
    key_indent: usize,
}

/// Rewrite the `version` and `sha1` values of the entry named `name`,
/// returning None when the entry cannot be located in block style
fn edit_pin(content: &str, name: &str, version: &str, sha1: &str) -> Option<String> {
    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();

    let entry = release_entries(&lines).into_iter().find(|entry| {
        entry_fields(&lines, entry)
            .any(|(i, field)| field.key == "name" && field.text(&lines[i]).as_deref() == Some(name))
    })?;

    let targets: Vec<(usize, Range<usize>, Quoting, &str)> = entry_fields(&lines, &entry)
        .filter_map(|(i, field)| match field.key {
            "version" => Some((i, field.value, field.quoting, version)),
            "sha1" => Some((i, field.value, field.quoting, sha1)),
            _ => None,
        })
        .collect();
    if targets.len() != 2 {
        return None;
    }

    for (i, value, quoting, replacement) in targets {
        let line = &lines[i];
        lines[i] = format!(
            "{}{}{}",
            &line[..value.start],
            render(replacement, quoting),
            &line[value.end..]
        );
    }
    Some(lines.concat())
}

fn release_entries(lines: &[String]) -> Vec<Entry> {
    let Some(start) = lines
        .iter()
        .position(|line| strip_comment(line.trim_end()) == "releases:")
    else {
        return Vec::new();
    };

    let mut entries: Vec<Entry> = Vec::new();
    let mut dash_indent = None;
    for (i, line) in lines.iter().enumerate().skip(start + 1) {
        let body = line.trim_end();
        let trimmed = body.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = body.len() - trimmed.len();
        if indent == 0 && !trimmed.starts_with('-') {
            break;
        }

        let item = trimmed
            .strip_prefix("- ")
            .filter(|_| *dash_indent.get_or_insert(indent) == indent);
        if let Some(rest) = item {
            let key_indent = body.len() - rest.trim_start().len();
            entries.push(Entry {
                lines: i..i + 1,
                key_indent,
            });
        } else if let Some(entry) = entries.last_mut() {
            entry.lines.end = i + 1;
        }
    }
    entries
}

/// The top-level fields of an entry, with their line index
fn entry_fields<'a>(
    lines: &'a [String],
    entry: &'a Entry,
) -> impl Iterator<Item = (usize, Field<'a>)> + 'a {
    entry.lines.clone().filter_map(move |i| {
        let field = parse_field(&lines[i], entry.key_indent)?;
        Some((i, field))
    })
}

/// Parse a `key: scalar` line whose key starts at column `indent`
fn parse_field(line: &str, indent: usize) -> Option<Field<'_>> {
    let body = line.trim_end_matches(['\n', '\r']);
    let rest = body.get(indent..)?;
    if rest.starts_with(' ') || !body[..indent].chars().all(|c| c == ' ' || c == '-') {
        return None;
    }

    let colon = rest.find(':')?;
    let key = &rest[..colon];
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return None;
    }

    let after = &rest[colon + 1..];
    if !after.is_empty() && !after.starts_with(' ') {
        return None;
    }
    let start = indent + colon + 1 + (after.len() - after.trim_start().len());
    let value = &body[start..];

    let (quoting, len) = match value.chars().next() {
        Some('"') => (Quoting::Double, closing_double(value)? + 1),
        Some('\'') => (Quoting::Single, closing_single(value)? + 1),
        Some('|' | '>' | '{' | '[' | '&' | '*' | '!') => return None,
        _ => (Quoting::Plain, strip_comment(value).trim_end().len()),
    };

    Some(Field {
        key,
        value: start..start + len,
        quoting,
    })
}

fn closing_double(value: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in value.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

fn closing_single(value: &str) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn strip_comment(text: &str) -> &str {
    match text.find(" #") {
        Some(at) => &text[..at],
        None => text,
    }
}

/// Render `value` in the quoting the old value used. A plain value that
/// YAML would not read back as the same string is double quoted.
fn render(value: &str, quoting: Quoting) -> String {
    match quoting {
        Quoting::Single => format!("'{}'", value.replace('\'', "''")),
        Quoting::Plain if reads_back_as_string(value) => value.to_string(),
        Quoting::Plain | Quoting::Double => {
            format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
        }
    }
}

fn reads_back_as_string(value: &str) -> bool {
    !value.is_empty()
        && !value.contains(" #")
        && matches!(
            serde_yaml::from_str::<serde_yaml::Value>(value),
            Ok(serde_yaml::Value::String(ref parsed)) if parsed == value
        )
}

fn write_atomic(path: &Path, content: &[u8]) -> KilnResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| KilnError::io(format!("creating temporary lock in {}", dir.display()), e))?;
    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| KilnError::io(format!("writing temporary lock for {}", path.display()), e))?;

    // Keep the mode of the file being replaced
    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| KilnError::io("copying lock file permissions", e))?;
    }

    tmp.persist(path)
        .map_err(|e| KilnError::io(format!("replacing {}", path.display()), e.error))?;

    debug!("Wrote {}", path.display());
    Ok(())
}

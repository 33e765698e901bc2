//! `key=value` property files (`tomcat.conf`, `password.conf`).
//!
//! Lines are trimmed; blank lines and `#` comments are skipped; the first
//! `=` separates key from value. Stores are written sorted by key, through a
//! temporary file that is renamed over the target, so readers never observe
//! a partially written file.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Permission bits for files owned by an instance.
pub const DEFAULT_FILE_MODE: u32 = 0o660;

/// Parse property text into `into`, overwriting keys that already exist.
pub fn parse_properties(content: &str, into: &mut BTreeMap<String, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, ""),
        };
        into.insert(key.to_string(), value.to_string());
    }
}

/// Load a property file into `into`.
pub fn load_properties(path: &Path, into: &mut BTreeMap<String, String>) -> io::Result<()> {
    let content = fs::read_to_string(path)?;
    parse_properties(&content, into);
    Ok(())
}

pub fn render_properties(properties: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in properties {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Replace `path` with the full contents of `properties`.
pub fn store_properties(path: &Path, properties: &BTreeMap<String, String>) -> io::Result<()> {
    let staging = staging_path(path);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(DEFAULT_FILE_MODE);
    }

    let result = options.open(&staging).and_then(|mut file| {
        file.write_all(render_properties(properties).as_bytes())?;
        file.sync_all()
    });

    if let Err(e) = result {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }

    fs::rename(&staging, path)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

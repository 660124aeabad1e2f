//! Differ configuration file.
//!
//! An INI-like format with two sections:
//!
//! ```ini
//! [compare]
//! from = old-release      ; or `-` for "no source"
//! to = new-release
//!
//! [output]
//! path = update.spatch
//! compress = 1
//! ```
//!
//! Blank lines and lines starting with `;` or `#` are ignored, as are keys
//! this version does not know.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Parsed differ configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffConfig {
    /// Source path, `-` meaning "no source".
    pub from: String,
    /// Target path.
    pub to: String,
    /// Container output path.
    pub output: String,
    pub compress: bool,
    /// Icon for a wrapper executable build; carried, not interpreted.
    pub icon: Option<String>,
}

impl DiffConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut section = String::new();
        let mut from = None;
        let mut to = None;
        let mut output = None;
        let mut compress = false;
        let mut icon = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(inner) = line.strip_prefix('[') {
                section = inner
                    .strip_suffix(']')
                    .ok_or_else(|| Error::Config(format!("line {}: unterminated section", idx + 1)))?
                    .trim()
                    .to_ascii_lowercase();
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("line {}: expected `key = value`", idx + 1)))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            match (section.as_str(), key.as_str()) {
                ("compare", "from") => from = Some(value),
                ("compare", "to") => to = Some(value),
                ("output", "path") => output = Some(value),
                ("output", "compress") => compress = parse_bool(&value, idx + 1)?,
                ("output", "icon") => icon = Some(value),
                _ => (),
            }
        }

        Ok(DiffConfig {
            from: from.ok_or_else(|| Error::Config("missing [compare] from".into()))?,
            to: to.ok_or_else(|| Error::Config("missing [compare] to".into()))?,
            output: output.ok_or_else(|| Error::Config("missing [output] path".into()))?,
            compress,
            icon,
        })
    }

    /// The source path, unless configured as the `-` sentinel.
    pub fn source(&self) -> Option<&Path> {
        if self.from == "-" {
            None
        } else {
            Some(Path::new(&self.from))
        }
    }
}

fn parse_bool(value: &str, line: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(Error::Config(format!(
            "line {}: expected 0/1/false/true, got `{}`",
            line, other
        ))),
    }
}

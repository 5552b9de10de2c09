//! `.ini`-style configuration loading.
//!
//! [`crate::parameters::Parameters::from_sections`] already specifies the
//! contract this module feeds it: a nested `HashMap<String,
//! HashMap<String, String>>`, one inner map per `[Section]`. This module
//! is the thin, file-format-level piece upstream of that contract — a
//! deliberately small hand-rolled parser rather than a pulled-in crate,
//! since `spec.md` treats the `.ini` format itself as an external
//! collaborator specified only at the interface level (§6.1); there is no
//! ecosystem crate this corpus reaches for here the way it does for
//! logging or error types.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

pub type Sections = HashMap<String, HashMap<String, String>>;

/// Reads `path` and parses it into [`Sections`]. `[Section]` headers open
/// a new section; `key = value` or `key: value` lines add to the
/// currently open section; blank lines and lines starting with `;` or `#`
/// are comments. A `key`/`value` line encountered before any `[Section]`
/// header, or a non-comment line matching neither shape, is a malformed
/// file and reported as a [`ConfigError`].
pub fn load_sections(path: &Path) -> Result<Sections, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_sections(&contents, path)
}

/// Parses already-read `.ini` text into [`Sections`]. Split out from
/// [`load_sections`] so the compute driver can broadcast the raw file text
/// once from rank 0 and have every rank parse its own copy, rather than
/// every rank hitting the filesystem independently.
pub fn parse_sections(contents: &str, path: &Path) -> Result<Sections, ConfigError> {
    let mut sections: Sections = HashMap::new();
    let mut current: Option<String> = None;

    for (line_number, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let Some(section) = current.as_ref() else {
            return Err(malformed_line(path, line_number, raw_line));
        };
        let Some((key, value)) = split_key_value(line) else {
            return Err(malformed_line(path, line_number, raw_line));
        };
        sections
            .entry(section.clone())
            .or_default()
            .insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(sections)
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let separator = line.find(['=', ':'])?;
    Some((&line[..separator], &line[separator + 1..]))
}

fn malformed_line(path: &Path, line_number: usize, raw_line: &str) -> ConfigError {
    ConfigError::MalformedScalar {
        section: path.display().to_string(),
        key: format!("line {}", line_number + 1),
        value: raw_line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_keys_and_comments() {
        let text = "\
; a comment
[SimParameters]
max_particles_local = 10000
time_step: 0.008

# another comment
[Boundary]
min = 0,0
max = 1.5,2
";
        let sections = parse_sections(text, Path::new("params.ini")).unwrap();
        assert_eq!(
            sections["SimParameters"]["max_particles_local"],
            "10000"
        );
        assert_eq!(sections["SimParameters"]["time_step"], "0.008");
        assert_eq!(sections["Boundary"]["max"], "1.5,2");
    }

    #[test]
    fn key_before_any_section_header_is_malformed() {
        let text = "time_step = 0.01\n[SimParameters]\n";
        let result = parse_sections(text, Path::new("params.ini"));
        assert!(matches!(result, Err(ConfigError::MalformedScalar { .. })));
    }

    #[test]
    fn line_with_no_separator_is_malformed() {
        let text = "[SimParameters]\nnonsense_without_separator\n";
        let result = parse_sections(text, Path::new("params.ini"));
        assert!(matches!(result, Err(ConfigError::MalformedScalar { .. })));
    }

    #[test]
    fn empty_section_with_no_keys_parses_cleanly() {
        let text = "[EmptySection]\n";
        let sections = parse_sections(text, Path::new("params.ini")).unwrap();
        assert!(sections["EmptySection"].is_empty());
    }
}

//! File-backed repository of named query templates.
//!
//! A template is plain SQL plus a metadata header. The header grammar is
//! line-oriented: a line contributes a parameter entry iff it starts with the
//! `---` marker and contains a colon; the key is the text between the marker
//! and the first colon, trimmed; the value is the remainder, trimmed. Lines
//! that miss either rule are ordinary SQL comments and are ignored, so
//! human-readable documentation can share the marker.
//!
//! A template may carry a secondary count statement, demarcated by a line
//! whose trimmed text equals `# hlx:metadata`.

use std::fs;
use std::path::PathBuf;

use quarry_error::{closest_match, ErrorCode, ErrorContext, QuarryError, Result};

/// File extension appended to resolved template names.
pub const TEMPLATE_EXTENSION: &str = ".sql";

/// Prefix marking a metadata header line.
const HEADER_MARKER: &str = "---";

/// Sentinel line separating the main statement from the count statement.
const METADATA_SENTINEL: &str = "# hlx:metadata";

/// Declared parameter metadata: an ordered mapping from parameter name to its
/// default value (query authors overload the value as documentation for
/// parameters without a meaningful default).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMetadata {
    entries: Vec<(String, String)>,
}

impl ParameterMetadata {
    /// Upsert: repeated keys keep their first position and take the last value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The self-documentation object echoed in the result envelope.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, value) in &self.entries {
            object.insert(name.clone(), serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(object)
    }
}

/// A named template, freshly loaded from durable storage.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub name: String,
    pub body: String,
    pub parameters: ParameterMetadata,
}

/// The template body split at the metadata sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateStatements {
    pub main: String,
    pub metadata: Option<String>,
}

/// Read-only catalog rooted at a directory of `.sql` templates; safely shared
/// across concurrent invocations.
#[derive(Debug, Clone)]
pub struct QueryCatalog {
    root: PathBuf,
}

impl QueryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Loads a template by name. The name maps to a relative path: any
    /// leading separator is stripped and the template extension appended.
    pub fn load(&self, name: &str) -> Result<QueryTemplate> {
        let relative = name.trim_start_matches('/');
        if relative.is_empty() || relative.contains("..") {
            return Err(self.not_found(name));
        }

        let path = self.root.join(format!("{}{}", relative, TEMPLATE_EXTENSION));
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(self.not_found(name));
            }
            Err(e) => {
                return Err(QuarryError::new(
                    ErrorCode::TemplateUnreadable,
                    format!("Failed to read template '{}': {}", relative, e),
                ));
            }
        };

        let parameters = parse_header(&body);
        Ok(QueryTemplate {
            name: relative.to_string(),
            body,
            parameters,
        })
    }

    /// Names of all templates under the catalog root, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.root)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                file_name
                    .strip_suffix(TEMPLATE_EXTENSION)
                    .map(|s| s.to_string())
            })
            .collect();
        names.sort();
        names
    }

    fn not_found(&self, name: &str) -> QuarryError {
        let available = self.available();
        let mut err = QuarryError::new(
            ErrorCode::QueryNotFound,
            format!("No query named '{}'", name),
        )
        .with_context(ErrorContext::QueryNotFound {
            name: name.to_string(),
            available_queries: available.clone(),
        });
        if let Some(suggestion) = closest_match(name, &available) {
            err = err.with_hint(format!("Did you mean '{}'?", suggestion));
        }
        err
    }
}

/// Scans the body for metadata header lines.
pub fn parse_header(body: &str) -> ParameterMetadata {
    let mut metadata = ParameterMetadata::default();
    for line in body.lines() {
        let Some(rest) = line.strip_prefix(HEADER_MARKER) else {
            continue;
        };
        let Some((key, value)) = rest.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        metadata.insert(key, value.trim());
    }
    metadata
}

/// Splits the body on the first metadata sentinel line. Without a sentinel
/// the whole body is the main statement and no count query is run.
pub fn split_statements(body: &str) -> TemplateStatements {
    let mut main_lines = Vec::new();
    let mut metadata_lines = Vec::new();
    let mut seen_sentinel = false;

    for line in body.lines() {
        if !seen_sentinel && line.trim() == METADATA_SENTINEL {
            seen_sentinel = true;
            continue;
        }
        if seen_sentinel {
            metadata_lines.push(line);
        } else {
            main_lines.push(line);
        }
    }

    let metadata = if seen_sentinel {
        let text = metadata_lines.join("\n").trim().to_string();
        (!text.is_empty()).then_some(text)
    } else {
        None
    };

    TemplateStatements {
        main: main_lines.join("\n").trim().to_string(),
        metadata,
    }
}

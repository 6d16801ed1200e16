//! Configuration validation with unknown field detection.
//!
//! Serde silently ignores unknown keys, so a typo such as `"buget"` would
//! leave the default budget in place. [`validate_config`] walks the raw JSON
//! and reports such keys with a suggestion.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "providers",
    "agents",
    "budget",
    "conversation",
    "transcript",
    "logging",
    "pricing",
];

/// Known fields for each section, as (section path, fields).
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("providers", &["openai", "anthropic", "gemini"]),
    ("agents", &["defaults", "openai", "anthropic", "gemini"]),
    (
        "agents.defaults",
        &["max_tokens", "temperature", "max_response_chars"],
    ),
    ("budget", &["token_ceiling", "warning_fraction"]),
    (
        "conversation",
        &[
            "theme",
            "turn_delay_secs",
            "history_window",
            "max_turns",
            "seed",
        ],
    ),
    ("transcript", &["enabled", "dir", "console"]),
    ("logging", &["format", "level", "file"]),
];

const KNOWN_PROVIDER: &[&str] = &["api_key", "api_base"];
const KNOWN_AGENT_ENTRY: &[&str] = &["enabled", "name", "model"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let message = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path,
            message,
        });
    }
    has_unknown
}

fn section<'a>(root: &'a Value, path: &str) -> Option<&'a serde_json::Map<String, Value>> {
    path.split('.')
        .try_fold(root, |value, key| value.get(key))
        .and_then(|v| v.as_object())
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                path: String::new(),
                message: "Config must be a JSON object".to_string(),
            });
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic {
        level: DiagnosticLevel::Ok,
        path: String::new(),
        message: "Valid JSON".to_string(),
    });

    let mut has_unknown = check_keys(obj, "", KNOWN_TOP_LEVEL, &mut diagnostics);
    for (path, known) in KNOWN_SECTIONS {
        if let Some(map) = section(raw, path) {
            has_unknown |= check_keys(map, path, known, &mut diagnostics);
        }
    }
    for name in ["openai", "anthropic", "gemini"] {
        let path = format!("providers.{}", name);
        if let Some(map) = section(raw, &path) {
            has_unknown |= check_keys(map, &path, KNOWN_PROVIDER, &mut diagnostics);
        }
        let path = format!("agents.{}", name);
        if let Some(map) = section(raw, &path) {
            has_unknown |= check_keys(map, &path, KNOWN_AGENT_ENTRY, &mut diagnostics);
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "All fields recognized".to_string(),
        });
    }

    // Keys in the file are readable by anyone who can read the file.
    if let Some(providers) = obj.get("providers").and_then(|v| v.as_object()) {
        for (name, provider) in providers {
            let has_key = provider
                .get("api_key")
                .and_then(|v| v.as_str())
                .map(|k| !k.is_empty())
                .unwrap_or(false);
            if has_key {
                diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Warn,
                    path: format!("providers.{}.api_key", name),
                    message: "Stored in plain text; consider the environment variable instead"
                        .to_string(),
                });
            }
        }
    }

    // Typed checks only make sense once the shape parses.
    match serde_json::from_value::<Config>(raw.clone()) {
        Ok(config) => {
            if let Err(e) = config.validate() {
                diagnostics.push(Diagnostic {
                    level: DiagnosticLevel::Error,
                    path: String::new(),
                    message: e.to_string(),
                });
            }
        }
        Err(e) => diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: String::new(),
            message: format!("Invalid value: {}", e),
        }),
    }

    diagnostics
}

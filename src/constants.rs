//! Header constant resolution.
//!
//! The vendor ships `wlmData.h`, a C header whose `const int` declarations are
//! the only documentation of the numbers the driver expects and returns. This
//! module turns that text into a [`ConstantNamespace`] and, alongside it, the
//! [`ErrorCatalog`] used to tell measurements apart from error codes.
//!
//! The dialect is deliberately narrow: a value is either an integer literal
//! (hex, binary, octal or decimal) or a `+`-separated sum of literals and names
//! that were declared *earlier* in the file. Resolution is a single top-to-bottom
//! pass. A forward reference fails that line; [`ResolvePolicy`] decides whether
//! the failure aborts the whole header or is skipped with a diagnostic.
//!
//! ```
//! use wlm_daq::constants::{resolve_header, ResolvePolicy};
//!
//! let header = "// Constants\nconst int cStop = 0;\nconst int ErrTemperature = -1000;\n\
//!               const int ErrTempNotMeasured = ErrTemperature + -5;\n";
//! let report = resolve_header(header, ResolvePolicy::Strict)?;
//! assert_eq!(report.namespace.get("ErrTempNotMeasured"), Some(-1005));
//! # Ok::<(), wlm_daq::WlmError>(())
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::ErrorCatalog;
use crate::error::{WlmError, WlmResult};

/// Substring that opens the constants block of the header.
pub const SECTION_MARKER: &str = "Constants";

/// Keyword sequence that introduces a declaration.
pub const DECLARATION_KEYWORD: &str = "const int";

/// What to do with a declaration that cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvePolicy {
    /// Abort on the first malformed declaration.
    #[default]
    Strict,
    /// Skip the line, log a warning and record it in [`HeaderReport::skipped`].
    Lenient,
}

/// Immutable mapping from constant name to resolved value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantNamespace {
    values: HashMap<String, i64>,
    order: Vec<String>,
}

impl ConstantNamespace {
    /// Resolved value of `name`, if declared.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// Resolved value of `name`, or [`WlmError::UnknownConstant`].
    pub fn require(&self, name: &str) -> WlmResult<i64> {
        self.get(name).ok_or_else(|| WlmError::UnknownConstant {
            name: name.to_string(),
        })
    }

    /// Whether `name` was declared.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of distinct names; a redeclaration counts once.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no constant was resolved.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Constants in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> + '_ {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.values[name]))
    }

    fn install(&mut self, name: &str, value: i64) -> Option<i64> {
        let previous = self.values.insert(name.to_string(), value);
        if previous.is_none() {
            self.order.push(name.to_string());
        }
        previous
    }
}

/// A declaration skipped under [`ResolvePolicy::Lenient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDeclaration {
    /// 1-based line number in the header.
    pub line: usize,
    /// The trimmed source line
    pub text: String,
    /// Why it could not be resolved
    pub reason: String,
}

/// Output of header resolution.
#[derive(Debug, Clone, Default)]
pub struct HeaderReport {
    /// Every resolved constant
    pub namespace: ConstantNamespace,
    /// Error codes partitioned by channel
    pub catalog: ErrorCatalog,
    /// Declarations that failed to resolve. Always empty under `Strict`.
    pub skipped: Vec<SkippedDeclaration>,
}

/// Read and resolve the header at `path`.
pub fn load_header(path: impl AsRef<Path>, policy: ResolvePolicy) -> WlmResult<HeaderReport> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(WlmError::HeaderNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = text.len(), "Read wlmData header");
    resolve_header(&text, policy)
}

/// Resolve header text into a namespace and error catalog.
pub fn resolve_header(text: &str, policy: ResolvePolicy) -> WlmResult<HeaderReport> {
    let mut report = HeaderReport::default();
    let mut in_section = false;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        if !in_section {
            if line.contains(SECTION_MARKER) {
                in_section = true;
            } else {
                continue;
            }
        }
        let Some(pos) = line.find(DECLARATION_KEYWORD) else {
            continue;
        };

        match parse_declaration(&line[pos + DECLARATION_KEYWORD.len()..], &report.namespace) {
            Ok((name, value)) => {
                if let Some(previous) = report.namespace.install(&name, value) {
                    warn!(name = %name, previous, value, line = line_no, "Constant redeclared");
                }
                report.catalog.classify_constant(&name, value);
            }
            Err(reason) => {
                let text = line.trim().to_string();
                match policy {
                    ResolvePolicy::Strict => {
                        return Err(WlmError::MalformedDeclaration {
                            line: line_no,
                            text,
                            reason,
                        });
                    }
                    ResolvePolicy::Lenient => {
                        warn!(line = line_no, text = %text, reason = %reason, "Skipping unresolvable declaration");
                        report.skipped.push(SkippedDeclaration {
                            line: line_no,
                            text,
                            reason,
                        });
                    }
                }
            }
        }
    }

    debug!(
        constants = report.namespace.len(),
        read_errors = report.catalog.read_errors().len(),
        set_errors = report.catalog.set_errors().len(),
        skipped = report.skipped.len(),
        "Resolved header constants"
    );
    Ok(report)
}

/// Split `name = value` and resolve the value against already-known names.
fn parse_declaration(rest: &str, known: &ConstantNamespace) -> Result<(String, i64), String> {
    let body = rest.split("//").next().unwrap_or_default();
    let body: String = body
        .chars()
        .filter(|c| !matches!(c, ';' | '\t' | '\n' | '\r'))
        .collect();

    let (name, raw_value) = body
        .split_once('=')
        .ok_or_else(|| "missing '=' assignment".to_string())?;
    let name = name.trim();
    let raw_value = raw_value.trim();

    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(format!("invalid constant name '{name}'"));
    }
    if raw_value.is_empty() {
        return Err(format!("no value assigned to '{name}'"));
    }

    if let Some(value) = parse_int_literal(raw_value) {
        return Ok((name.to_string(), value));
    }

    let mut sum: i64 = 0;
    for term in raw_value.split('+').map(str::trim) {
        let value = match parse_int_literal(term) {
            Some(v) => v,
            None => known
                .get(term)
                .ok_or_else(|| format!("'{term}' is neither a literal nor a previously declared constant"))?,
        };
        sum = sum
            .checked_add(value)
            .ok_or_else(|| format!("value of '{name}' overflows"))?;
    }
    Ok((name.to_string(), sum))
}

/// Parse an integer literal with C-style base prefixes.
///
/// Accepts an optional sign, `0x`, `0b`, `0o` prefixes and a leading `0` for
/// octal. Anything else, including an empty string, yields `None`.
pub fn parse_int_literal(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.as_bytes().first()? {
        b'-' => (true, raw[1..].trim_start()),
        b'+' => (false, raw[1..].trim_start()),
        _ => (false, raw),
    };

    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (8, oct)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };

    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(body, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

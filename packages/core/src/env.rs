//! Environment materialization.
//!
//! Turns raw secret material into `NAME=VALUE` assignments for the target
//! process.
//!
//! # Ordering
//!
//! Assignments keep the order they were produced in (directory traversal
//! order or JSON map iteration order). That order carries no meaning:
//! compare two sets with [`EnvironmentSet::to_map`], never element by
//! element.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::io::Write;

/// A single environment variable to hand to the target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretAssignment {
    name: OsString,
    value: OsString,
}

impl SecretAssignment {
    /// Create an assignment, rejecting names the environment block cannot
    /// represent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the name is empty or contains `=`.
    pub fn new(name: impl Into<OsString>, value: impl Into<OsString>) -> Result<Self> {
        let name = name.into();
        let lossy = name.to_string_lossy();
        if lossy.is_empty() || lossy.contains('=') {
            return Err(Error::InvalidName(lossy.into_owned()));
        }

        Ok(Self {
            name,
            value: value.into(),
        })
    }

    /// Create an assignment whose value is raw bytes, kept byte-exact.
    pub fn from_bytes(name: impl Into<OsString>, value: Vec<u8>) -> Result<Self> {
        Self::new(name, os_string_from_bytes(value))
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn value(&self) -> &OsStr {
        &self.value
    }

    /// Render as `NAME=VALUE` for display.
    pub fn render(&self) -> String {
        format!(
            "{}={}",
            self.name.to_string_lossy(),
            self.value.to_string_lossy()
        )
    }
}

#[cfg(unix)]
fn os_string_from_bytes(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn os_string_from_bytes(bytes: Vec<u8>) -> OsString {
    OsString::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Ordered list of assignments handed to the launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSet {
    assignments: Vec<SecretAssignment>,
}

impl EnvironmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an assignment. Duplicate names are kept; the consumer decides
    /// which one wins.
    pub fn push(&mut self, assignment: SecretAssignment) {
        self.assignments.push(assignment);
    }

    /// Build a set from `(file name, contents)` pairs read in file mode.
    ///
    /// Contents are used verbatim, trailing newlines included.
    pub fn from_files<I>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (OsString, Vec<u8>)>,
    {
        let mut set = Self::new();
        for (name, contents) in files {
            set.push(SecretAssignment::from_bytes(name, contents)?);
        }
        Ok(set)
    }

    /// Build a set from a JSON payload holding a flat object of strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the payload is not UTF-8, not valid JSON,
    /// not an object, or holds a non-string value. No partial set is ever
    /// returned.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let content = std::str::from_utf8(payload)
            .map_err(|e| Error::Format(format!("payload is not valid UTF-8: {}", e)))?;

        let json: serde_json::Value =
            serde_json::from_str(content).map_err(|e| Error::Format(e.to_string()))?;

        let object = json.as_object().ok_or_else(|| {
            Error::Format("payload must be a JSON object with key-value pairs".to_string())
        })?;

        let mut set = Self::new();
        for (key, value) in object {
            let value = value.as_str().ok_or_else(|| {
                Error::Format(format!(
                    "value for key '{}' must be a string, found: {}",
                    key, value
                ))
            })?;
            set.push(SecretAssignment::new(key, value)?);
        }

        Ok(set)
    }

    /// Put the given inherited variables under the secrets.
    ///
    /// An inherited variable whose name a secret also defines is dropped, so
    /// the secret wins whichever end of the block a consumer reads from.
    /// Duplicates among the secrets themselves are left alone.
    pub fn merge_inherited<I>(self, inherited: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let shadowed: HashSet<&OsStr> = self.assignments.iter().map(|a| a.name()).collect();
        let mut merged: Vec<SecretAssignment> = inherited
            .into_iter()
            .filter(|(name, _)| !shadowed.contains(name.as_os_str()))
            .filter_map(|(name, value)| SecretAssignment::new(name, value).ok())
            .collect();
        merged.extend(self.assignments);

        Self {
            assignments: merged,
        }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecretAssignment> {
        self.assignments.iter()
    }

    /// Collapse into a map with last-wins semantics, for order-insensitive
    /// comparisons.
    pub fn to_map(&self) -> HashMap<OsString, OsString> {
        self.assignments
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect()
    }

    /// Write the operator-facing listing: a header followed by one
    /// `## NAME=VALUE` line per assignment.
    ///
    /// This prints secret values in clear text.
    pub fn render<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "## Found {} env var(s):", self.assignments.len())?;
        for assignment in &self.assignments {
            writeln!(out, "## {}", assignment.render())?;
        }
        out.flush()
    }
}

impl<'a> IntoIterator for &'a EnvironmentSet {
    type Item = &'a SecretAssignment;
    type IntoIter = std::slice::Iter<'a, SecretAssignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.iter()
    }
}

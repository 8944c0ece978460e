//! API key store loaded from a `API_KEY,USERNAME` file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::observability::metrics;

/// Errors raised while loading the key file.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to open key file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error reading key file: {0}")]
    Read(#[from] std::io::Error),
}

/// Immutable mapping from API key to username.
///
/// Built once at startup and never written afterwards, so it can be shared
/// behind an `Arc` and read from every stream without locking.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: HashMap<String, String>,
    skipped_lines: Vec<usize>,
}

impl KeyStore {
    /// Load the key file at `path`.
    pub fn load(path: &Path) -> Result<Self, KeyStoreError> {
        let file = File::open(path).map_err(|source| KeyStoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_reader(BufReader::new(file))?;

        tracing::info!(
            path = %path.display(),
            keys = store.len(),
            skipped = store.skipped_lines.len(),
            "Loaded API keys"
        );
        metrics::record_keys_loaded(store.len());

        Ok(store)
    }

    /// Parse key records from any line-oriented reader.
    ///
    /// Empty lines are ignored. A line that is not valid UTF-8, or that does
    /// not split into exactly two non-empty comma-separated fields, is skipped
    /// with a warning. Later records for the same key replace earlier ones.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, KeyStoreError> {
        let mut store = Self::default();

        for (index, line) in reader.split(b'\n').enumerate() {
            let mut line = line?;
            let line_number = index + 1;

            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }

            match std::str::from_utf8(&line).ok().and_then(parse_record) {
                Some((api_key, username)) => {
                    store.keys.insert(api_key.to_string(), username.to_string());
                }
                None => {
                    tracing::warn!(line = line_number, "Malformed line in key file, skipping");
                    store.skipped_lines.push(line_number);
                }
            }
        }

        Ok(store)
    }

    /// Look up the username for an API key. Exact, case-sensitive match.
    pub fn resolve(&self, api_key: &str) -> Option<&str> {
        self.keys.get(api_key).map(String::as_str)
    }

    /// Number of distinct keys loaded.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 1-based line numbers that were skipped as malformed.
    pub fn skipped_lines(&self) -> &[usize] {
        &self.skipped_lines
    }
}

impl<K, U> FromIterator<(K, U)> for KeyStore
where
    K: Into<String>,
    U: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, U)>>(iter: I) -> Self {
        Self {
            keys: iter
                .into_iter()
                .map(|(key, user)| (key.into(), user.into()))
                .collect(),
            skipped_lines: Vec::new(),
        }
    }
}

fn parse_record(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.split(',');
    let api_key = fields.next()?.trim();
    let username = fields.next()?.trim();
    if fields.next().is_some() || api_key.is_empty() || username.is_empty() {
        return None;
    }
    Some((api_key, username))
}

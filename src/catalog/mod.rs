//! Catalog keys and the in-memory dedup index.
//!
//! Catalog keys are ISBN-13 strings. ISBN-10 inputs are converted to their
//! 978-prefixed ISBN-13 form so that the same book listed either way maps to
//! one catalog row.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::info;

use crate::storage::CatalogStore;

// ---------------------------------------------------------------------------
// ISBN normalisation
// ---------------------------------------------------------------------------

/// Normalise a raw ISBN (with or without hyphens/spaces) to ISBN-13.
///
/// Returns `None` if the input is not a checksum-valid ISBN-10 or ISBN-13.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match cleaned.len() {
        13 if is_valid_isbn13(&cleaned) => Some(cleaned),
        10 if is_valid_isbn10(&cleaned) => Some(isbn10_to_13(&cleaned)),
        _ => None,
    }
}

/// Find the first valid ISBN embedded in free text (e.g. a listing title).
pub fn extract_isbn(text: &str) -> Option<String> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '-' || c == 'X' || c == 'x'))
        .filter(|token| token.chars().filter(|c| c.is_ascii_digit()).count() >= 9)
        .find_map(normalize_isbn)
}

fn is_valid_isbn13(s: &str) -> bool {
    if !s.bytes().all(|b| b.is_ascii_digit()) || !(s.starts_with("978") || s.starts_with("979")) {
        return false;
    }
    let sum: u32 = s
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    sum % 10 == 0
}

fn is_valid_isbn10(s: &str) -> bool {
    let bytes = s.as_bytes();
    if !bytes[..9].iter().all(u8::is_ascii_digit) {
        return false;
    }
    let check = match bytes[9] {
        b'X' => 10,
        b @ b'0'..=b'9' => (b - b'0') as u32,
        _ => return false,
    };
    let sum: u32 = bytes[..9]
        .iter()
        .enumerate()
        .map(|(i, b)| (10 - i as u32) * (b - b'0') as u32)
        .sum::<u32>()
        + check;
    sum % 11 == 0
}

fn isbn10_to_13(isbn10: &str) -> String {
    let body = format!("978{}", &isbn10[..9]);
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    format!("{body}{check}")
}

// ---------------------------------------------------------------------------
// Dedup index
// ---------------------------------------------------------------------------

/// Catalog keys already known to the store. Built once per run.
#[derive(Debug, Default)]
pub struct DedupIndex {
    keys: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every catalog key currently persisted.
    pub async fn load(store: &dyn CatalogStore) -> Result<Self> {
        let keys: HashSet<String> = store
            .catalog_keys()
            .await
            .context("Failed to load catalog keys for dedup index")?
            .into_iter()
            .collect();
        info!(known = keys.len(), "Dedup index loaded");
        Ok(Self { keys })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `true` if the key was not already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<String> for DedupIndex {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

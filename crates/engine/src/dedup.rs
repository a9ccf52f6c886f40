//! Recipient de-duplication and roster import.
//!
//! Every recipient source: directory resolution, hand-written lists, uploaded
//! roster files: funnels through [`dedupe`], so a job never holds two attempts
//! for the same channel address.
//!
//! Identity is the normalized address (trimmed, lowercased), but the address
//! handed on is only trimmed: push tokens and in-app ids are case-sensitive.
//! The first occurrence wins; later duplicates are dropped silently since
//! they are routine in bulk uploads. Blank addresses never reach the
//! comparison.

use std::collections::HashSet;

use serde::Serialize;

use rollcall_common::types::Recipient;

/// Canonical form used for duplicate detection.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Lazily drop blank and duplicate recipients from `recipients`.
///
/// Yielded recipients carry their trimmed address with its case intact.
pub fn dedupe<I>(recipients: I) -> Dedupe<I::IntoIter>
where
    I: IntoIterator<Item = Recipient>,
{
    Dedupe {
        inner: recipients.into_iter(),
        seen: HashSet::new(),
    }
}

/// Iterator returned by [`dedupe`].
pub struct Dedupe<I> {
    inner: I,
    seen: HashSet<String>,
}

impl<I> Iterator for Dedupe<I>
where
    I: Iterator<Item = Recipient>,
{
    type Item = Recipient;

    fn next(&mut self) -> Option<Recipient> {
        for mut recipient in self.inner.by_ref() {
            let normalized = normalize_address(&recipient.address);
            if normalized.is_empty() {
                continue;
            }
            if self.seen.insert(normalized) {
                recipient.address = recipient.address.trim().to_string();
                return Some(recipient);
            }
        }
        None
    }
}

/// Result of parsing an uploaded roster file.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub recipients: Vec<Recipient>,
    pub count: usize,
    /// Rows that could not be read as an address.
    pub skipped: usize,
}

/// Parse a roster upload: a header row, then one `address[,display name]`
/// per line. Columns past the second are ignored, and quoted fields may hold
/// commas.
///
/// Malformed rows are counted and skipped; blank rows are ignored.
pub fn import_recipients(bytes: &[u8]) -> ImportSummary {
    let mut skipped = 0usize;
    let mut rows = Vec::new();

    for line in bytes.split(|b| *b == b'\n').skip(1) {
        let Ok(line) = std::str::from_utf8(line) else {
            skipped += 1;
            continue;
        };

        match parse_row(line) {
            Row::Blank => {}
            Row::Malformed => skipped += 1,
            Row::Recipient(recipient) => rows.push(recipient),
        }
    }

    let recipients: Vec<Recipient> = dedupe(rows).collect();

    tracing::debug!(
        count = recipients.len(),
        skipped,
        "Roster import parsed"
    );

    ImportSummary {
        count: recipients.len(),
        recipients,
        skipped,
    }
}

enum Row {
    Blank,
    Malformed,
    Recipient(Recipient),
}

fn parse_row(line: &str) -> Row {
    let line = line.trim();
    if line.is_empty() {
        return Row::Blank;
    }

    let mut fields = split_fields(line).into_iter().map(unquote);
    let address = fields.next().unwrap_or_default();
    let name = fields.next();

    if address.is_empty() {
        return Row::Blank;
    }
    if !address.contains('@') || address.chars().any(char::is_whitespace) {
        return Row::Malformed;
    }

    let normalized = normalize_address(address);
    let display_name = name
        .filter(|n| !n.is_empty())
        .unwrap_or(address)
        .to_string();

    Row::Recipient(Recipient::new(normalized, address, display_name))
}

/// Split on commas outside double quotes.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(field)
}

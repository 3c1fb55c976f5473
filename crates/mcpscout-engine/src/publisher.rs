//! Read-modify-write application of results to the published files
//!
//! Every write carries the version token captured by the read it is based
//! on. A stale token fails the write; nothing here retries or overwrites.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use mcpscout_config::FilesConfig;
use mcpscout_store::{StoreError, VersionedFileStore};
use mcpscout_utils::types::{CategoryInfo, ItemKey};

use crate::category::CategoryTable;
use crate::queue::ResolvedEntry;

const ROOT_LABEL: &str = "categories:";

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Re-indent `entry` so its least indented line starts at `indent`
fn rebase(entry: &str, indent: usize) -> Vec<String> {
    let base = entry
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(indent_of)
        .min()
        .unwrap_or(0);
    let pad = " ".repeat(indent);

    entry
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{pad}{}", &line[base.min(indent_of(line))..])
            }
        })
        .collect()
}

/// Index of the `<category>:` label, matched at an indentation of at most `max_indent`
fn find_label(lines: &[String], category: &str, max_indent: usize) -> Option<usize> {
    let label = format!("{category}:");
    lines
        .iter()
        .position(|line| indent_of(line) <= max_indent && line.trim() == label)
}

/// The `- id:` value of a formatted entry
fn entry_key(formatted: &str) -> Option<ItemKey> {
    published_keys(formatted.lines().find(|l| !l.trim().is_empty())?)
        .into_iter()
        .next()
}

/// Entries whose id is not yet in `content`, first occurrence of each id only
#[must_use]
pub fn unpublished<'e>(content: &str, entries: &'e [ResolvedEntry]) -> Vec<&'e ResolvedEntry> {
    let mut seen = published_keys(content);
    entries
        .iter()
        .filter(|entry| match entry_key(&entry.formatted_entry) {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}

/// Insert resolved entries into the entries YAML text.
///
/// Entries for an existing category go after the last non-blank line of its
/// block, two indentation levels below the label. Categories without a block
/// get a new block appended at the end, described from `descriptions`.
/// Entries whose id the text already holds are skipped, so applying the same
/// results twice changes nothing. Lines outside the touched blocks are left
/// byte-identical.
#[must_use]
pub fn insert_entries(
    content: &str,
    entries: &[ResolvedEntry],
    descriptions: &BTreeMap<String, String>,
    indent_width: usize,
) -> String {
    let fresh = unpublished(content, entries);
    if fresh.is_empty() {
        return content.to_string();
    }

    let mut lines: Vec<String> = if content.trim().is_empty() {
        vec![ROOT_LABEL.to_string()]
    } else {
        content.lines().map(str::to_string).collect()
    };

    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for entry in fresh {
        match grouped.iter_mut().find(|(cat, _)| *cat == entry.category) {
            Some((_, list)) => list.push(&entry.formatted_entry),
            None => grouped.push((&entry.category, vec![&entry.formatted_entry])),
        }
    }

    for (category, items) in grouped {
        match find_label(&lines, category, indent_width) {
            Some(label_idx) => {
                let label_indent = indent_of(&lines[label_idx]);
                let block_end = lines[label_idx + 1..]
                    .iter()
                    .position(|l| !l.trim().is_empty() && indent_of(l) <= label_indent)
                    .map_or(lines.len(), |offset| label_idx + 1 + offset);
                let insert_at = (label_idx..block_end)
                    .rev()
                    .find(|&i| !lines[i].trim().is_empty())
                    .map_or(block_end, |i| i + 1);

                let new_lines: Vec<String> = items
                    .iter()
                    .flat_map(|e| rebase(e, label_indent + 2 * indent_width))
                    .collect();
                lines.splice(insert_at..insert_at, new_lines);
            }
            None => {
                while lines.last().is_some_and(|l| l.trim().is_empty()) {
                    lines.pop();
                }
                let w = indent_width;
                let description = descriptions
                    .get(category)
                    .cloned()
                    .unwrap_or_else(|| category.replace('_', " "));
                let quoted = serde_json::to_string(&description)
                    .unwrap_or_else(|_| format!("\"{category}\""));

                lines.push(format!("{}{category}:", " ".repeat(w)));
                lines.push(format!("{}description: {quoted}", " ".repeat(2 * w)));
                lines.push(format!("{}servers:", " ".repeat(2 * w)));
                lines.extend(items.iter().flat_map(|e| rebase(e, 3 * w)));
            }
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Insert one dated section of `reports` before the first second-level heading
#[must_use]
pub fn insert_report_section(content: &str, date: NaiveDate, reports: &[String]) -> String {
    let body: Vec<&str> = reports.iter().map(|r| r.trim_end()).collect();
    let section = format!("## {}\n\n{}\n", date.format("%Y-%m-%d"), body.join("\n\n"));

    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.starts_with("## ") {
            return format!("{}{section}\n{}", &content[..offset], &content[offset..]);
        }
        offset += line.len();
    }

    let head = content.trim_end();
    if head.is_empty() {
        section
    } else {
        format!("{head}\n\n{section}")
    }
}

/// Item keys already present in the entries file
#[must_use]
pub fn published_keys(content: &str) -> BTreeSet<ItemKey> {
    content
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("- id:"))
        .map(|rest| rest.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|key| !key.is_empty())
        .collect()
}

/// Publishes results and learned categories to the versioned file store
pub struct Publisher<'a> {
    files: &'a dyn VersionedFileStore,
    paths: &'a FilesConfig,
    indent_width: usize,
}

impl<'a> Publisher<'a> {
    #[must_use]
    pub fn new(
        files: &'a dyn VersionedFileStore,
        paths: &'a FilesConfig,
        indent_width: usize,
    ) -> Self {
        Self {
            files,
            paths,
            indent_width,
        }
    }

    pub async fn published_keys(&self) -> Result<BTreeSet<ItemKey>, StoreError> {
        let file = self.files.read(&self.paths.entries).await?;
        Ok(published_keys(&file.content))
    }

    pub async fn load_categories(&self) -> Result<CategoryTable, StoreError> {
        let file = self.files.read(&self.paths.categories).await?;
        self.parse_table(&file.content)
    }

    /// Append every unpublished entry in one write; returns the number written.
    ///
    /// Entries already in the file are skipped. If none are left nothing is
    /// written.
    pub async fn publish_entries(
        &self,
        entries: &[ResolvedEntry],
        table: &CategoryTable,
    ) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let file = self.files.read(&self.paths.entries).await?;
        let fresh = unpublished(&file.content, entries).len();
        if fresh == 0 {
            debug!(
                file = %self.paths.entries,
                skipped = entries.len(),
                "Entries already published"
            );
            return Ok(0);
        }

        let descriptions: BTreeMap<String, String> = entries
            .iter()
            .filter_map(|e| {
                table
                    .description_of(&e.category)
                    .map(|d| (e.category.clone(), d.to_string()))
            })
            .collect();

        let updated = insert_entries(&file.content, entries, &descriptions, self.indent_width);
        let message = format!("mcpscout: add {fresh} server entries");
        self.files
            .write(&self.paths.entries, &updated, file.version.as_ref(), &message)
            .await?;

        info!(
            file = %self.paths.entries,
            entries = fresh,
            skipped = entries.len() - fresh,
            "Published entries"
        );
        Ok(fresh)
    }

    /// Insert one dated section holding every report; returns the number written
    pub async fn publish_reports(
        &self,
        reports: &[String],
        date: NaiveDate,
    ) -> Result<usize, StoreError> {
        if reports.is_empty() {
            return Ok(0);
        }

        let file = self.files.read(&self.paths.reports).await?;
        let updated = insert_report_section(&file.content, date, reports);
        let message = format!("mcpscout: record {} unresolved servers", reports.len());
        self.files
            .write(&self.paths.reports, &updated, file.version.as_ref(), &message)
            .await?;

        info!(file = %self.paths.reports, reports = reports.len(), "Published unresolved reports");
        Ok(reports.len())
    }

    /// Add `prefix` to the published table and return the merged table.
    ///
    /// The table is re-read first so concurrent additions are kept; a prefix
    /// someone else already mapped is left alone and nothing is written.
    pub async fn publish_category(
        &self,
        prefix: &str,
        info: CategoryInfo,
    ) -> Result<CategoryTable, StoreError> {
        let file = self.files.read(&self.paths.categories).await?;
        let mut table = self.parse_table(&file.content)?;
        let category = info.category.clone();

        if !table.insert(prefix, info) {
            debug!(prefix, "Prefix already published");
            return Ok(table);
        }

        let json = table.to_json().map_err(|e| {
            StoreError::InvalidResponse(format!("{}: {e}", self.paths.categories))
        })?;
        let message = format!("mcpscout: map prefix {prefix} to {category}");
        self.files
            .write(&self.paths.categories, &json, file.version.as_ref(), &message)
            .await?;

        info!(prefix, category = %category, "Published learned category");
        Ok(table)
    }

    fn parse_table(&self, content: &str) -> Result<CategoryTable, StoreError> {
        CategoryTable::parse(content)
            .map_err(|e| StoreError::InvalidResponse(format!("{}: {e}", self.paths.categories)))
    }
}

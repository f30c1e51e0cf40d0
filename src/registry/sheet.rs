//! Citation URLs from the parameter-sources spreadsheet.
//!
//! The sheet is exported as CSV with one row per parameter. Sources live in
//! two columns: `URL` (semicolon or newline separated) and `External Sources`
//! (markdown, with URLs as links or bare text and the citation in bold above
//! them).

use std::io::Read;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::types::{CitationRole, Parameter, SourceCitation};
use crate::resolve::scoring::normalize_url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SheetRow {
    #[serde(rename = "Parameter/Variable Name", default)]
    pub name: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(rename = "External Sources", default)]
    pub external: String,
}

pub fn read_rows(reader: impl Read) -> Result<Vec<SheetRow>> {
    let mut sheet = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut rows = Vec::new();
    for (i, record) in sheet.deserialize::<SheetRow>().enumerate() {
        // Header is line 1.
        let row = record.with_context(|| format!("Invalid sheet row {}", i + 2))?;
        if !row.name.trim().is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn trim_url(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', ':', ')', ']', '>', '"', '\''])
}

/// URLs in markdown text: link targets first, then bare URLs, in order of
/// appearance and without duplicates.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        let url = trim_url(url);
        if url.len() > "https://".len() && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    };

    let mut rest = text;
    while let Some(pos) = rest.find("](http") {
        let target = &rest[pos + 2..];
        let end = target.find([')', ' ', '\n']).unwrap_or(target.len());
        push(&target[..end]);
        rest = &target[end..];
    }

    for word in text.split(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '(' | '[')) {
        if word.starts_with("http://") || word.starts_with("https://") {
            // The tail of a markdown link keeps its closing bracket; trim_url drops it.
            push(word);
        }
    }
    urls
}

/// Values in the `URL` column.
pub fn split_url_field(field: &str) -> Vec<String> {
    field
        .split([';', '\n'])
        .map(str::trim)
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .map(|u| trim_url(u).to_string())
        .collect()
}

/// Bold text on the URL's line or up to four lines above it.
pub fn citation_label(external: &str, url: &str) -> Option<String> {
    let lines: Vec<&str> = external.lines().collect();
    let at = lines.iter().position(|l| l.contains(url))?;
    lines[at.saturating_sub(4)..=at].iter().rev().find_map(|line| {
        let start = line.find("**")? + 2;
        let len = line[start..].find("**")?;
        let label = line[start..start + len].split_whitespace().collect::<Vec<_>>().join(" ");
        (!label.is_empty()).then_some(label)
    })
}

/// Citations the row adds to `param`: one per URL not already cited.
/// `URL` column entries are primary, `External Sources` ones supplementary.
pub fn new_citations(row: &SheetRow, param: &Parameter) -> Vec<SourceCitation> {
    let mut known: Vec<String> = param
        .citations
        .iter()
        .filter_map(|c| c.url.as_deref().map(normalize_url))
        .collect();
    let primary = split_url_field(&row.url);
    let external = extract_urls(&row.external);

    let mut added = Vec::new();
    let candidates = primary
        .iter()
        .map(|u| (u, CitationRole::Primary))
        .chain(external.iter().map(|u| (u, CitationRole::Supplementary)));
    for (url, role) in candidates {
        let key = normalize_url(url);
        if known.contains(&key) {
            continue;
        }
        known.push(key);
        let n = param.citations.len() + added.len() + 1;
        added.push(SourceCitation {
            id: format!("{}-{}", param.id, n),
            text: citation_label(&row.external, url).unwrap_or_default(),
            url: Some(url.clone()),
            document_id: None,
            role,
        });
    }
    added
}

/// Registry parameter a sheet row describes, by id or by name.
pub fn match_row<'a>(row: &SheetRow, params: &'a [Parameter]) -> Option<&'a Parameter> {
    let name = row.name.trim();
    params
        .iter()
        .find(|p| p.id == name)
        .or_else(|| params.iter().find(|p| p.name.trim().eq_ignore_ascii_case(name)))
}

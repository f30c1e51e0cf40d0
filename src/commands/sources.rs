use std::collections::BTreeMap;

use anyhow::Result;

use crate::state::AppState;

/// List catalog documents, grouped by publication year
pub async fn sources(state: &AppState, limit: usize) -> Result<()> {
    let docs = state.store.list().await?;

    if docs.is_empty() {
        println!("No documents in the catalog yet. Use `ingest` to add some.");
        return Ok(());
    }

    let mut by_year: BTreeMap<Option<u16>, Vec<_>> = BTreeMap::new();
    for doc in docs.iter().take(limit) {
        by_year.entry(doc.year).or_default().push(doc);
    }

    let mut output = String::new();
    for (year, year_docs) in by_year.iter().rev() {
        match year {
            Some(y) => output.push_str(&format!("{}\n", y)),
            None => output.push_str("Undated\n"),
        }
        for doc in year_docs {
            output.push_str(&format!(
                "  - {} ({}) {}\n",
                doc.name,
                text_size(doc.size),
                &doc.id[..12.min(doc.id.len())]
            ));
            if let Some(citation) = &doc.citation {
                output.push_str(&format!("    Citation: {}\n", citation));
            }
            if let Some(url) = &doc.original_url {
                output.push_str(&format!("    Source: {}\n", url));
            }
            if let Some(file) = &doc.local_filename {
                output.push_str(&format!("    Local file: {}\n", file));
            }
        }
    }
    if docs.len() > limit {
        output.push_str(&format!("... and {} more\n", docs.len() - limit));
    }
    print!("{}", output);

    Ok(())
}

/// Extracted text length. `size` counts characters, not bytes.
fn text_size(chars: usize) -> String {
    match chars {
        0..=999 => format!("{} chars", chars),
        1_000..=999_999 => format!("{:.1}k chars", chars as f64 / 1_000.0),
        _ => format!("{:.1}M chars", chars as f64 / 1_000_000.0),
    }
}

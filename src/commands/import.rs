use std::path::Path;

use anyhow::Result;

use crate::state::AppState;

/// `.csv` files are the parameter-sources sheet; anything else is a JSON
/// parameter file.
pub async fn import(state: &AppState, file: &Path, dry_run: bool) -> Result<()> {
    let is_sheet = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_sheet {
        return import_sheet(state, file, dry_run).await;
    }

    let changes = state.registry.import_file(file, dry_run).await?;
    print!("{}", changes.render());
    if dry_run {
        println!("Dry run: registry not modified");
    } else if changes.is_empty() {
        println!("Registry already matches {}", file.display());
    } else {
        println!(
            "Imported {} new and {} changed parameters from {}",
            changes.added.len(),
            changes.changed.len(),
            file.display()
        );
    }
    Ok(())
}

async fn import_sheet(state: &AppState, file: &Path, dry_run: bool) -> Result<()> {
    let outcome = state.registry.import_sheet(file, dry_run).await?;
    for (parameter, citation) in &outcome.added {
        println!(
            "  + {} {} {}",
            parameter,
            citation.url.as_deref().unwrap_or_default(),
            citation.text
        );
    }
    for name in &outcome.unmatched {
        println!("  ? no parameter named {:?}", name);
    }
    println!(
        "{} rows matched, {} unmatched, {} new citations{}",
        outcome.matched,
        outcome.unmatched.len(),
        outcome.added.len(),
        if dry_run { " (dry run: registry not modified)" } else { "" }
    );
    Ok(())
}

use anyhow::Result;

use crate::resolve::catalog::CatalogIndex;
use crate::state::AppState;

pub fn index(state: &AppState, rebuild: bool) -> Result<()> {
    let path = state.config.index_path();
    let existing = CatalogIndex::load(&path);

    let stale = match &existing {
        Some(index) => index.is_stale(&state.library)?,
        None => true,
    };

    if !stale && !rebuild {
        if let Some(index) = existing {
            println!(
                "Catalog index is current: {} documents, built {}",
                index.entries.len(),
                index.built_at.to_rfc3339()
            );
        }
        return Ok(());
    }

    let index = CatalogIndex::build(&state.library)?;
    index.save(&path)?;
    println!(
        "Catalog index rebuilt{}: {} documents from {}",
        if stale { " (was stale)" } else { "" },
        index.entries.len(),
        state.library.root().display()
    );
    Ok(())
}

use std::path::Path;

use anyhow::Result;

use crate::report;
use crate::state::AppState;

pub async fn export(state: &AppState, file: &Path) -> Result<()> {
    let verdicts = state.registry.latest_verdicts().await?;
    report::export_csv(file, &verdicts)?;
    println!("Wrote {} verdicts to {}", verdicts.len(), file.display());
    Ok(())
}

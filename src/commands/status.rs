use anyhow::Result;
use chrono::{TimeZone, Utc};

use crate::report::StatusSummary;
use crate::state::AppState;

pub async fn status(state: &AppState, parameter: Option<&str>) -> Result<()> {
    if let Some(id) = parameter {
        return history(state, id).await;
    }

    let parameters = state.registry.parameters().await?;
    let verdicts = state.registry.latest_verdicts().await?;
    let summary = StatusSummary::from_verdicts(&verdicts);

    println!("{} parameters registered", parameters.len());
    println!("{}", summary.render());

    let unverified: Vec<&str> = parameters
        .iter()
        .filter(|p| !verdicts.iter().any(|v| v.parameter_id == p.id))
        .map(|p| p.id.as_str())
        .collect();
    if !unverified.is_empty() {
        println!("not yet verified: {}", unverified.join(", "));
    }
    Ok(())
}

async fn history(state: &AppState, id: &str) -> Result<()> {
    let Some(param) = state.registry.get_parameter(id).await? else {
        println!("Unknown parameter `{}`", id);
        return Ok(());
    };
    println!("{} ({}) claimed value {}", param.name, param.id, param.value);
    for citation in &param.citations {
        println!(
            "  cites: {}{}",
            citation.label(),
            citation
                .document_id
                .as_deref()
                .map(|d| format!(" -> {}", &d[..12.min(d.len())]))
                .unwrap_or_default()
        );
    }

    let runs = state.registry.verdict_history(id).await?;
    if runs.is_empty() {
        println!("No verdicts yet.");
        return Ok(());
    }
    for v in &runs {
        let when = Utc
            .timestamp_opt(v.verified_at, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {}  {:<12} {:>3}%  {} source(s){}{}",
            when,
            v.classification.as_str(),
            v.confidence,
            v.evidence_source_count(),
            if v.synthesis_used { ", synthesized" } else { "" },
            if v.needs_human_review { ", needs review" } else { "" },
        );
        if !v.reasoning.is_empty() {
            println!("      {}", v.reasoning);
        }
    }
    Ok(())
}

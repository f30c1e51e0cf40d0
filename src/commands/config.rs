use crate::state::AppState;

/// Print the effective verification settings after env and flag overrides
pub fn config(state: &AppState) {
    let c = &state.config;
    println!(
        "Verification configuration:\n\
         sources_dir: {}\n\
         data_dir: {}\n\
         chunk_size: {}\n\
         chunk_overlap: {}\n\
         direct_threshold: {}\n\
         early_exit_confidence: {}\n\
         synthesis_cap: {}\n\
         review_threshold: {}\n\
         max_attempts: {}\n\
         call_timeout: {}s\n\
         workers: {}\n\
         batch_mode: {}\n\
         extract_command: {}\n\
         model: {}",
        c.sources_dir.display(),
        c.data_dir.display(),
        c.chunk_size,
        c.chunk_overlap,
        c.direct_threshold,
        c.early_exit_confidence,
        c.synthesis_cap,
        c.review_threshold,
        c.max_attempts,
        c.call_timeout.as_secs(),
        c.workers,
        c.batch_mode,
        c.extract_command.as_deref().unwrap_or("(none)"),
        state.llm.model(),
    );
}

//! Context window estimates for models no provider reports metadata for.

/// Context window assumed when nothing is known about a model.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 8192;

/// Local model families whose window is usually encoded in the model name.
const LOCAL_FAMILIES: &[&str] = &["llama", "mistral", "mixtral"];

/// Estimate a model's context window from its name.
///
/// Matching is a case-insensitive substring test evaluated top to bottom, so
/// the more specific names must come before their prefixes (`gpt-4-turbo`
/// before `gpt-4`). Returns `None` for names that match no known family.
pub fn estimate_context_window(model: &str) -> Option<u64> {
    let model = model.to_lowercase();
    let has = |needle: &str| model.contains(needle);

    let window = if has("gpt-4-turbo") || has("gpt-4-1106") {
        128_000
    } else if has("gpt-4-32k") {
        32_768
    } else if has("gpt-4") {
        8_192
    } else if has("gpt-3.5-turbo-16k") {
        16_384
    } else if has("gpt-3.5-turbo") {
        4_096
    } else if has("claude-3-opus") || has("claude-3-sonnet") || has("claude-3-haiku") {
        200_000
    } else if has("claude-2") || has("claude") {
        100_000
    } else if LOCAL_FAMILIES.iter().any(|family| has(family)) {
        if has("32k") {
            32_768
        } else if has("16k") {
            16_384
        } else {
            8_192
        }
    } else {
        return None;
    };

    Some(window)
}

/// Like [`estimate_context_window`], but falls back to [`DEFAULT_CONTEXT_WINDOW`].
pub fn fallback_context_window(model: &str) -> u64 {
    estimate_context_window(model).unwrap_or_else(|| {
        tracing::warn!(
            model,
            "Unknown model, using default context limit of {}",
            DEFAULT_CONTEXT_WINDOW
        );
        DEFAULT_CONTEXT_WINDOW
    })
}

pub mod documents;
pub mod normalize;
pub mod types;

use anyhow::{Context, Result};
use tracing::info;

pub use normalize::{adopt_reply_suggestions, normalize};
pub use types::{CorrectionResult, RawCorrection, SourceType};

use crate::{
    config::CorrectionSettings,
    llm::{ChatMessage, LlmClient, LlmRequest, MessageRole},
};

/// Send `essay` to the configured model and normalize its reply.
pub async fn check_essay(
    llm: &LlmClient,
    settings: &CorrectionSettings,
    essay: &str,
) -> Result<CorrectionResult> {
    let request = build_correction_request(settings, essay);

    let response = llm
        .execute(request)
        .await
        .context("essay correction call failed")?;

    let result = interpret_reply(&response.text, essay);

    info!(
        provider = %response.provider,
        model = %response.model,
        tokens = response.token_usage.total_tokens,
        errors = result.errors.len(),
        suggestions = result.suggestions.len(),
        "essay corrected"
    );

    Ok(result)
}

/// Normalize the reply against `essay`, then fall back to the suggestions
/// the model returned at the top level of its JSON object.
fn interpret_reply(reply: &str, essay: &str) -> CorrectionResult {
    let raw = RawCorrection::from_model_text(reply);
    let mut result = normalize(&raw, essay);
    adopt_reply_suggestions(&mut result, &raw);
    result
}

fn build_correction_request(settings: &CorrectionSettings, essay: &str) -> LlmRequest {
    LlmRequest::new(
        settings.models.correction_model.clone(),
        vec![
            ChatMessage::new(MessageRole::System, settings.prompts.system_prompt.clone()),
            ChatMessage::new(
                MessageRole::User,
                settings.prompts.render_user_message(essay),
            ),
        ],
    )
}

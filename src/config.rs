use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;

pub const MODULE_CORRECTION: &str = "essay_correction";
pub const ESSAY_PLACEHOLDER: &str = "{{ESSAY}}";

const DEFAULT_CORRECTION_MODEL: &str = "openrouter/openai/gpt-4o-mini";

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an experienced English teacher correcting student essays. Check grammar, spelling, punctuation and word choice, and suggest improvements to sentence structure.

## Output Format
Reply with a single JSON object and nothing else:
- "feedback": overall comments on the essay, as plain text.
- "suggestions": an array of short improvement suggestions.
- "corrected_text": the full essay with every correction applied.
- "detailed_errors": an array of objects with the keys "original" (the exact wrong phrase as it appears in the essay), "corrected" (its replacement), "explanation" and "error_type" (one of grammar, spelling, vocabulary, punctuation, style).
Example output:
{
  "feedback": "Clear structure, but several verb tense errors.",
  "suggestions": ["Use more linking words between paragraphs."],
  "corrected_text": "Yesterday I went to the park.",
  "detailed_errors": [
    {"original": "I go to the park", "corrected": "I went to the park", "explanation": "Use the past tense for a finished action.", "error_type": "grammar"}
  ]
}"#;

const DEFAULT_USER_TEMPLATE: &str = "Please correct the following English essay:\n\n{{ESSAY}}";

/// Model and prompt configuration of the correction module, stored in
/// `module_configs` and seeded with defaults at startup.
#[derive(Clone, Debug, Default)]
pub struct CorrectionSettings {
    pub models: CorrectionModels,
    pub prompts: CorrectionPrompts,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionModels {
    pub correction_model: String,
}

impl Default for CorrectionModels {
    fn default() -> Self {
        Self {
            correction_model: DEFAULT_CORRECTION_MODEL.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionPrompts {
    pub system_prompt: String,
    pub user_template: String,
}

impl Default for CorrectionPrompts {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl CorrectionPrompts {
    /// Fill the user template with the essay. A template without the
    /// placeholder gets the essay appended.
    pub fn render_user_message(&self, essay: &str) -> String {
        if self.user_template.contains(ESSAY_PLACEHOLDER) {
            self.user_template.replace(ESSAY_PLACEHOLDER, essay)
        } else {
            format!("{}\n\n{}", self.user_template.trim_end(), essay)
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModuleConfigRow {
    models: Value,
    prompts: Value,
}

impl CorrectionSettings {
    pub async fn ensure_defaults(pool: &PgPool) -> Result<()> {
        let models = serde_json::to_value(CorrectionModels::default())?;
        let prompts = serde_json::to_value(CorrectionPrompts::default())?;

        sqlx::query(
            "INSERT INTO module_configs (module_name, models, prompts) VALUES ($1, $2, $3)
             ON CONFLICT (module_name) DO NOTHING",
        )
        .bind(MODULE_CORRECTION)
        .bind(&models)
        .bind(&prompts)
        .execute(pool)
        .await
        .context("failed to seed correction module configuration")?;

        Ok(())
    }

    pub async fn load(pool: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, ModuleConfigRow>(
            "SELECT models, prompts FROM module_configs WHERE module_name = $1",
        )
        .bind(MODULE_CORRECTION)
        .fetch_optional(pool)
        .await
        .context("failed to load correction module configuration")?;

        let Some(row) = row else {
            warn!("correction module configuration missing, using defaults");
            return Ok(Self::default());
        };

        parse_correction_settings(row.models, row.prompts)
    }
}

fn parse_correction_settings(models: Value, prompts: Value) -> Result<CorrectionSettings> {
    let models: CorrectionModels =
        serde_json::from_value(models).context("invalid correction models configuration")?;
    let prompts: CorrectionPrompts =
        serde_json::from_value(prompts).context("invalid correction prompts configuration")?;
    Ok(CorrectionSettings { models, prompts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_fills_placeholder() {
        let prompts = CorrectionPrompts::default();
        let message = prompts.render_user_message("I goed home.");
        assert!(message.ends_with("\n\nI goed home."));
        assert!(!message.contains(ESSAY_PLACEHOLDER));
    }

    #[test]
    fn template_without_placeholder_appends_essay() {
        let prompts = CorrectionPrompts {
            system_prompt: String::new(),
            user_template: "Correct this:\n".into(),
        };
        assert_eq!(prompts.render_user_message("Text"), "Correct this:\n\nText");
    }

    #[test]
    fn stored_settings_are_parsed() {
        let settings = parse_correction_settings(
            json!({"correction_model": "poe/Claude-Sonnet"}),
            json!({"system_prompt": "sys", "user_template": "{{ESSAY}}"}),
        )
        .unwrap();
        assert_eq!(settings.models.correction_model, "poe/Claude-Sonnet");
        assert_eq!(settings.prompts.render_user_message("x"), "x");

        assert!(parse_correction_settings(json!({}), json!({})).is_err());
    }
}

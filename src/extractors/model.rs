//! Model-assisted recipe extraction
//!
//! Delegates extraction to an external completion model when the caller
//! expects pattern heuristics to do poorly. Output is parsed against the
//! lenient schema; a schema failure earns one stricter re-prompt, and a
//! second failure falls back to the local parser so the item still makes it
//! through the pipeline.

use crate::error::Result;
use crate::extractors::LocalParser;
use crate::models::ParsedRecipe;
use crate::services::model_client::CompletionModel;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You extract structured recipe data from forum posts.\n\
Return a single JSON object with these fields:\n\
  title (string), description (string or null),\n\
  ingredients (array of {item, amount, unit, notes}),\n\
  instructions (array of strings),\n\
  prep_time, cook_time, total_time, servings (number or string; ranges like \"2-4\" are fine),\n\
  difficulty, cuisine_type, meal_type (strings or null), dietary_tags (array of strings).\n\
Rules:\n\
- The item field holds only the ingredient name. Never put quantities or units into item.\n\
- Cooking steps belong in instructions, never in the ingredients array.\n\
- Copy amounts as written; do not convert ranges to single numbers.\n\
Return only the JSON object, no prose and no code fences.";

/// Model-assisted parser with local fallback
pub struct ModelParser {
    model: Arc<dyn CompletionModel>,
    local: LocalParser,
}

impl ModelParser {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            local: LocalParser::new(),
        }
    }

    /// Extract a loose recipe via the model.
    ///
    /// Transport failures propagate (they are retryable at the activity
    /// level); schema failures degrade to the local parser's output.
    pub async fn parse(&self, text: &str) -> Result<ParsedRecipe> {
        let prompt = format!("Extract the recipe from this post:\n\n{}", text);
        let reply = self.model.complete(&prompt, Some(SYSTEM_PROMPT), 0.2).await?;

        match parse_reply(&reply) {
            Ok(parsed) => Ok(parsed),
            Err(schema_err) => {
                warn!(error = %schema_err, "Model reply failed schema, re-prompting once");
                let strict = format!(
                    "Your previous reply could not be parsed ({}). \
                     Return ONLY a valid JSON object matching the schema, nothing else.\n\n\
                     Extract the recipe from this post:\n\n{}",
                    schema_err, text
                );
                let retry = self.model.complete(&strict, Some(SYSTEM_PROMPT), 0.0).await?;
                match parse_reply(&retry) {
                    Ok(parsed) => Ok(parsed),
                    Err(err) => {
                        warn!(error = %err, "Model reply failed schema twice, using local parser");
                        Ok(self.local.parse(text))
                    }
                }
            }
        }
    }
}

/// Parse a model reply into the lenient schema.
///
/// Models wrap JSON in fences or prose often enough that we cut the reply
/// down to the outermost object before deserializing.
fn parse_reply(reply: &str) -> std::result::Result<ParsedRecipe, String> {
    let json = extract_json_object(reply).ok_or("no JSON object in reply")?;
    let parsed: ParsedRecipe = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if parsed.title.trim().is_empty() {
        return Err("title is empty".to_string());
    }
    debug!(
        title = %parsed.title,
        ingredients = parsed.ingredients.len(),
        "Parsed model reply"
    );
    Ok(parsed)
}

fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&reply[start..=end])
}

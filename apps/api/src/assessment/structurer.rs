//! Structurer: asks the LLM to turn extracted form text into JSON.

use serde_json::Value;
use tracing::{info, warn};

use crate::assessment::prompts::{
    build_structuring_prompt, STRUCTURING_MAX_TOKENS, STRUCTURING_MODEL,
};
use crate::errors::AppError;
use crate::llm_client::{strip_code_fences, CompletionModel, CompletionRequest};
use crate::models::application::StructuredApplication;
use crate::retry::RetryPolicy;

/// Sends the extracted text to the LLM and returns the raw reply.
pub async fn request_structured_data(
    llm: &dyn CompletionModel,
    retry: &RetryPolicy,
    extracted_text: &str,
) -> Result<String, AppError> {
    let prompt = build_structuring_prompt(extracted_text);
    let request = CompletionRequest {
        model: STRUCTURING_MODEL,
        max_tokens: STRUCTURING_MAX_TOKENS,
        system: None,
        prompt: &prompt,
    };

    retry
        .run("Structuring", || llm.complete(&request))
        .await
        .map_err(|e| AppError::llm("processing the extracted data", &e))
}

/// Parses the reply as a JSON object. Anything else is kept verbatim as
/// `{"data": <reply>}` so the pipeline can continue.
pub fn parse_structured_reply(reply: &str) -> StructuredApplication {
    match serde_json::from_str::<Value>(strip_code_fences(reply)) {
        Ok(Value::Object(map)) => {
            let application = StructuredApplication::from_object(map);
            info!(
                "Structured application data with {} warning(s)",
                application.warnings.len()
            );
            for warning in &application.warnings {
                warn!("{warning}");
            }
            application
        }
        Ok(other) => {
            warn!("Structuring reply is JSON but not an object ({other}); keeping raw text");
            StructuredApplication::from_raw(reply)
        }
        Err(e) => {
            warn!("Structuring reply is not valid JSON ({e}); keeping raw text");
            StructuredApplication::from_raw(reply)
        }
    }
}

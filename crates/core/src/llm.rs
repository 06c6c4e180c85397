use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Capability interface for the answer generator. The model must
/// answer from the supplied context only; the prompt instructs it to
/// say so when the context does not contain the answer.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn complete(&self, question: &str, context: &str) -> Result<String, ServiceError>;
}

/// Assemble the grounded prompt sent to the chat model.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Use the following context to answer the question. Only use information that is \
         explicitly stated in the context or can be reasonably inferred from the document's \
         structure. If the information is not present, answer exactly: \
         \"The document does not contain this information.\"\n\n\
         Context:\n{context}\n\n\
         Question:\n{question}\n\n\
         Answer:"
    )
}

/// OpenAI-compatible chat completions endpoint
/// (`POST {base}/v1/chat/completions`).
pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Answerer for OpenAiChat {
    async fn complete(&self, question: &str, context: &str) -> Result<String, ServiceError> {
        let prompt = build_prompt(question, context);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_status("chat", response.status()));
        }

        let payload: Value = response.json().await?;
        let answer = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(ServiceError::Permanent(
                "chat model returned an empty answer".to_string(),
            ));
        }

        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_question_and_context() {
        let prompt = build_prompt("What is the total?", "The total is 42 euros.");
        assert!(prompt.contains("Context:\nThe total is 42 euros."));
        assert!(prompt.contains("Question:\nWhat is the total?"));
        assert!(prompt.contains("does not contain this information"));
    }
}

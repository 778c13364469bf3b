//! services/tutor_api/src/adapters/openai.rs
//!
//! This module contains the adapter for OpenAI's Responses API.
//! It implements the `GenerativeModelService` port for text-only turns; inline
//! attachments are reported as unsupported.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::responses::{CreateResponseArgs, Tool, WebSearchTool},
    Client,
};
use async_trait::async_trait;
use chain_tutor_core::domain::Credential;
use chain_tutor_core::ports::{
    ClientFactory, ContentPart, GenerateRequest, GenerateResponse, GenerativeModelService,
    PortError, PortResult,
};
use reqwest::header::HeaderValue;
use std::sync::Arc;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerativeModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: Client<OpenAIConfig>,
}

impl OpenAiAdapter {
    /// Creates a new `OpenAiAdapter`.
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }
}

/// Flattens the text parts of a turn. Inline data cannot travel through this backend.
fn text_input(parts: &[ContentPart]) -> PortResult<String> {
    let mut texts = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            ContentPart::Text(text) => texts.push(text.as_str()),
            ContentPart::InlineData { mime_type, .. } => {
                return Err(PortError::Unsupported(format!(
                    "inline {} attachments are not supported by the OpenAI backend",
                    mime_type
                )))
            }
        }
    }
    Ok(texts.join("\n\n"))
}

//=========================================================================================
// `GenerativeModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeModelService for OpenAiAdapter {
    async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse> {
        let input = text_input(&request.parts)?;

        let mut args = CreateResponseArgs::default();
        args.model(&request.model).input(input);
        if let Some(instructions) = &request.system_instruction {
            args.instructions(instructions.as_str());
        }
        if request.web_search {
            args.tools(vec![Tool::WebSearch(WebSearchTool::default())]);
        }
        let create = args
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .responses()
            .create(create)
            .await
            .map_err(|e: OpenAIError| PortError::Provider {
                status: None,
                message: e.to_string(),
            })?;

        // The Responses API reports citations as inline annotations, not grounding chunks.
        Ok(GenerateResponse {
            text: response.output_text().filter(|t| !t.is_empty()),
            grounding: None,
        })
    }
}

//=========================================================================================
// Client Factory
//=========================================================================================

#[derive(Clone, Debug, Default)]
pub struct OpenAiClientFactory;

impl ClientFactory for OpenAiClientFactory {
    fn build(&self, credential: &Credential) -> PortResult<Arc<dyn GenerativeModelService>> {
        // The key ends up in an `Authorization: Bearer` header on every call.
        HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|e| PortError::Unexpected(format!("API key is not a valid header value: {}", e)))?;

        let config = OpenAIConfig::new().with_api_key(credential.expose());
        Ok(Arc::new(OpenAiAdapter::new(Client::with_config(config))))
    }
}

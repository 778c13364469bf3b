//! services/tutor_api/src/adapters/gemini.rs
//!
//! This module contains the adapter for Google's Gemini `generateContent` REST API.
//! It implements the `GenerativeModelService` port and the `ClientFactory` that
//! builds it from a credential.

use async_trait::async_trait;
use chain_tutor_core::domain::Credential;
use chain_tutor_core::ports::{
    ClientFactory, ContentPart, GenerateRequest, GenerateResponse, GenerativeModelService,
    GroundingChunk, PortError, PortResult,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const API_KEY_HEADER: &str = "x-goog-api-key";

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Serialize, Debug)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
enum WirePart<'a> {
    Text(&'a str),
    InlineData(WireBlob<'a>),
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    google_search: Empty,
}

#[derive(Serialize, Debug)]
struct Empty {}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Deserialize, Debug)]
struct WireGroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Deserialize, Debug)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerativeModelService` against the Gemini REST API.
#[derive(Clone)]
pub struct GeminiAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiAdapter {
    /// Creates a new `GeminiAdapter`. Fails if the key cannot be sent as a header.
    pub fn new(base_url: &str, api_key: &str) -> PortResult<Self> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| PortError::Unexpected(format!("API key is not a valid header value: {}", e)))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn to_wire_body(request: &GenerateRequest) -> GenerateContentBody<'_> {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            ContentPart::InlineData { mime_type, data } => WirePart::InlineData(WireBlob {
                mime_type,
                data,
            }),
            ContentPart::Text(text) => WirePart::Text(text),
        })
        .collect();

    GenerateContentBody {
        contents: vec![WireContent {
            role: Some("user"),
            parts,
        }],
        system_instruction: request.system_instruction.as_deref().map(|text| WireContent {
            role: None,
            parts: vec![WirePart::Text(text)],
        }),
        tools: if request.web_search {
            vec![WireTool {
                google_search: Empty {},
            }]
        } else {
            Vec::new()
        },
    }
}

fn from_wire_response(response: GenerateContentResponse) -> GenerateResponse {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return GenerateResponse::default();
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| part.thought != Some(true))
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    let grounding = candidate.grounding_metadata.map(|metadata| {
        metadata
            .grounding_chunks
            .into_iter()
            .map(|chunk| match chunk.web {
                Some(web) => GroundingChunk {
                    uri: web.uri,
                    title: web.title,
                },
                None => GroundingChunk::default(),
            })
            .collect()
    });

    GenerateResponse {
        text: (!text.is_empty()).then_some(text),
        grounding,
    }
}

fn provider_error(status: reqwest::StatusCode, body: &str) -> PortError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => PortError::Provider {
            status: envelope
                .error
                .status
                .or_else(|| Some(status.as_u16().to_string())),
            message: envelope.error.message,
        },
        Err(_) => PortError::Provider {
            status: Some(status.as_u16().to_string()),
            message: body.trim().to_string(),
        },
    }
}

//=========================================================================================
// `GenerativeModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeModelService for GeminiAdapter {
    async fn generate(&self, request: GenerateRequest) -> PortResult<GenerateResponse> {
        let body = to_wire_body(&request);
        debug!(model = %request.model, parts = request.parts.len(), web_search = request.web_search, "Calling Gemini.");

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| PortError::Transport(e.to_string()))?;
            return Err(provider_error(status, &text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Unreadable Gemini response: {}", e)))?;
        Ok(from_wire_response(parsed))
    }
}

//=========================================================================================
// Client Factory
//=========================================================================================

/// Builds one `GeminiAdapter` per credential.
#[derive(Clone, Debug)]
pub struct GeminiClientFactory {
    base_url: String,
}

impl GeminiClientFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ClientFactory for GeminiClientFactory {
    fn build(&self, credential: &Credential) -> PortResult<Arc<dyn GenerativeModelService>> {
        Ok(Arc::new(GeminiAdapter::new(&self.base_url, credential.expose())?))
    }
}

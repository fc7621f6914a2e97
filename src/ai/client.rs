//! OpenAI client: chat completions, image generation and speech.

use std::future::Future;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateImageRequestArgs, CreateSpeechRequestArgs, Image,
        ImageModel, ImageResponseFormat, ImageSize, SpeechModel, Voice,
    },
    Client,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OpenAiConfig;
use crate::errors::AppError;

/// Upper bound on one OpenAI call, retries included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Error type for OpenAI calls.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("OpenAI API key not configured")]
    NotConfigured,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl From<OpenAIError> for AiError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::ApiError(api) => AiError::Api(api.message),
            OpenAIError::Reqwest(e) => AiError::RequestFailed(e.to_string()),
            OpenAIError::JSONDeserialize(e) => AiError::ParseError(e.to_string()),
            other => AiError::Api(other.to_string()),
        }
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        tracing::error!("OpenAI error: {}", err);
        match err {
            AiError::NotConfigured => AppError::Internal(err.to_string()),
            _ => AppError::Upstream(format!("AI service unavailable: {}", err)),
        }
    }
}

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn to_openai(&self) -> Result<ChatCompletionRequestMessage, AiError> {
        let content = self.content.clone();
        let built = match self.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .map(Into::into),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .map(Into::into),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()
                .map(Into::into),
        };
        built.map_err(|e| AiError::Api(format!("Failed to build {:?} message: {}", self.role, e)))
    }
}

/// Result of a chat completion.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    /// Text of the first choice, if any
    pub content: Option<String>,
    pub total_tokens: u32,
    /// Full response body, kept for the audit log
    pub raw: serde_json::Value,
}

/// Result of an image generation.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub url: Option<String>,
    pub raw: serde_json::Value,
}

/// OpenAI REST client. Holds no client when the API key is missing.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Option<Client<OpenAIConfig>>,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Self {
        let client = config.api_key.as_deref().map(|key| {
            let api_base = format!("{}/v1", config.base_url.trim_end_matches('/'));
            Client::with_config(
                OpenAIConfig::new()
                    .with_api_key(key)
                    .with_api_base(api_base),
            )
        });
        Self { client }
    }

    fn client(&self) -> Result<&Client<OpenAIConfig>, AiError> {
        self.client.as_ref().ok_or(AiError::NotConfigured)
    }

    /// Run a chat completion.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<ChatCompletion, AiError> {
        let client = self.client()?;
        let messages = messages
            .iter()
            .map(ChatMessage::to_openai)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .max_completion_tokens(max_tokens)
            .build()
            .map_err(|e| AiError::Api(e.to_string()))?;

        let response = bounded(client.chat().create(request)).await?;
        let raw =
            serde_json::to_value(&response).map_err(|e| AiError::ParseError(e.to_string()))?;

        Ok(ChatCompletion {
            content: response
                .choices
                .first()
                .and_then(|c| c.message.content.clone()),
            total_tokens: response.usage.map(|u| u.total_tokens).unwrap_or(0),
            raw,
        })
    }

    /// Generate a single image and return its temporary URL.
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        size: ImageSize,
    ) -> Result<GeneratedImage, AiError> {
        let client = self.client()?;
        let request = CreateImageRequestArgs::default()
            .model(image_model(model))
            .prompt(prompt)
            .n(1)
            .size(size)
            .response_format(ImageResponseFormat::Url)
            .build()
            .map_err(|e| AiError::Api(e.to_string()))?;

        let response = bounded(client.images().create(request)).await?;
        let raw =
            serde_json::to_value(&response).map_err(|e| AiError::ParseError(e.to_string()))?;

        let url = response.data.first().and_then(|image| match &**image {
            Image::Url { url, .. } => Some(url.clone()),
            Image::B64Json { .. } => None,
        });

        Ok(GeneratedImage { url, raw })
    }

    /// Synthesize speech and return the mp3 bytes.
    pub async fn speech(&self, model: &str, voice: &str, input: &str) -> Result<Vec<u8>, AiError> {
        let client = self.client()?;
        let request = CreateSpeechRequestArgs::default()
            .model(speech_model(model))
            .voice(speech_voice(voice))
            .input(input)
            .build()
            .map_err(|e| AiError::Api(e.to_string()))?;

        let response = bounded(client.audio().speech(request)).await?;
        Ok(response.bytes.to_vec())
    }
}

async fn bounded<T>(call: impl Future<Output = Result<T, OpenAIError>>) -> Result<T, AiError> {
    tokio::time::timeout(REQUEST_TIMEOUT, call)
        .await
        .map_err(|_| AiError::RequestFailed("request timed out".to_string()))?
        .map_err(AiError::from)
}

fn image_model(name: &str) -> ImageModel {
    match name {
        "dall-e-2" => ImageModel::DallE2,
        "dall-e-3" => ImageModel::DallE3,
        other => ImageModel::Other(other.to_string()),
    }
}

fn speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn speech_voice(name: &str) -> Voice {
    match name {
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => Voice::Alloy,
    }
}

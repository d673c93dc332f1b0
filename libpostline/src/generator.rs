//! Content generation
//!
//! The dispatcher's generation sweep asks a [`ContentGenerator`] for one
//! post per (agent, platform). The production implementation speaks the
//! chat-completions wire format against a configured endpoint and asks the
//! model to answer with a single JSON object; anything else is a
//! `GenerationError::Malformed`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::error::{GenerationError, Result};
use crate::platforms::HTTP_TIMEOUT_SECS;
use crate::types::Platform;

/// The agency profile fed into the prompt.
#[derive(Debug, Clone)]
pub struct AgencyProfile {
    pub name: String,
    pub description: String,
    pub tone: String,
}

/// One generated post, before it becomes a draft.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GeneratedPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Prompt for a downstream image generator; unused here but persisted
    /// by callers that want it.
    #[serde(default)]
    pub media_prompt: Option<String>,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate one post for the given platform.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Request` for transport trouble and
    /// `GenerationError::Malformed` when the model's answer is not the
    /// requested JSON object.
    async fn generate(&self, profile: &AgencyProfile, platform: Platform) -> Result<GeneratedPost>;
}

// ---- Chat-completions wire format ----

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct LlmGenerator {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl LlmGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn build_prompt(profile: &AgencyProfile, platform: Platform) -> String {
        format!(
            "You write social media posts for {name}, {description}. \
             Write one {platform} post in a {tone} tone. \
             Answer with a single JSON object with keys \"title\", \"content\", \
             \"hashtags\" (array of strings starting with '#') and optional \
             \"media_prompt\". No other text.",
            name = profile.name,
            description = profile.description,
            tone = profile.tone,
            platform = platform,
        )
    }

    /// Strip an optional markdown code fence around the model's JSON.
    fn extract_json(raw: &str) -> &str {
        let trimmed = raw.trim();
        let trimmed = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .unwrap_or(trimmed);
        trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
    }

    fn parse_reply(raw: &str) -> Result<GeneratedPost> {
        let post: GeneratedPost = serde_json::from_str(Self::extract_json(raw))
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        if post.content.trim().is_empty() {
            return Err(GenerationError::Malformed("empty content".to_string()).into());
        }
        Ok(post)
    }
}

#[async_trait]
impl ContentGenerator for LlmGenerator {
    async fn generate(&self, profile: &AgencyProfile, platform: Platform) -> Result<GeneratedPost> {
        let prompt = Self::build_prompt(profile, platform);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.8,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let reply = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GenerationError::Malformed("no choices in response".to_string()))?;

        Self::parse_reply(reply)
    }
}

/// Fixed-script generator for tests: returns planned posts in order, or a
/// planned error.
pub struct ScriptedGenerator {
    script: Mutex<Vec<Result<GeneratedPost>>>,
    calls: Mutex<Vec<Platform>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<GeneratedPost>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Generator that always returns the same post.
    pub fn repeating(post: GeneratedPost) -> Self {
        Self {
            script: Mutex::new(vec![Ok(post)]),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Generator that always fails.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(vec![Err(GenerationError::Request(message.to_string()).into())]),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Platform> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _profile: &AgencyProfile,
        platform: Platform,
    ) -> Result<GeneratedPost> {
        self.calls.lock().unwrap().push(platform);

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            // Clone-by-reconstruction: the last entry repeats.
            match script.first() {
                Some(Ok(post)) => Ok(post.clone()),
                Some(Err(e)) => Err(crate::PostlineError::Generation(match e {
                    crate::PostlineError::Generation(g) => g.clone(),
                    _ => GenerationError::Request("scripted failure".to_string()),
                })),
                None => Err(GenerationError::Request("empty script".to_string()).into()),
            }
        }
    }
}

//! rig-core integration for the reasoning engine.
//!
//! Uses rig-core's provider clients and Agent abstraction for
//! multi-provider support: Anthropic, OpenAI, Gemini, and any
//! OpenAI-compatible API.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers;

use crate::config::ProviderConfig;
use crate::models::{Intent, ProviderName};

use super::{parse_intent, FileTagRequest, OracleError, ReasoningEngine, SynthesisRequest};

/// Maximum tokens per LLM completion response.
const MAX_TOKENS: u64 = 16384;

/// Build an agent from a rig-core client and prompt it.
///
/// Always sets `max_tokens`; without it some providers (e.g. Gemini)
/// default to a low limit that truncates responses.
macro_rules! prompt_text {
    ($client:expr, $model:expr, $system:expr, $user:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble($system)
            .temperature(0.0)
            .max_tokens(MAX_TOKENS)
            .build();
        agent
            .prompt($user)
            .await
            .map_err(|e| OracleError::Api(format!("{} API error: {e}", $label)))
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key)
            .map_err(|e| OracleError::Api(format!("failed to create {} client: {e}", $label)))
    }};
}

/// rig-core based reasoning engine.
///
/// Wraps rig-core's multi-provider client system. The provider name in
/// config selects which rig-core provider to use.
pub struct RigOracle {
    config: ProviderConfig,
}

impl RigOracle {
    /// Create a new RigOracle with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, OracleError> {
        if config.api_key.is_none() {
            return Err(OracleError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or the provider-specific env var.",
                config.name,
                crate::constants::ENV_API_KEY
            )));
        }
        Ok(Self { config })
    }

    fn api_key(&self) -> Result<&str, OracleError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| OracleError::NotConfigured("missing API key".to_string()))
    }

    /// Require `base_url` for OpenAI-compatible providers.
    fn require_base_url(&self) -> Result<&str, OracleError> {
        self.config.base_url.as_deref().ok_or_else(|| {
            OracleError::NotConfigured(
                "openai-compatible provider requires base_url to be set".to_string(),
            )
        })
    }

    /// Make a completion call through rig-core and return the raw response text.
    async fn call_rig(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError> {
        let api_key = self.api_key()?;
        let model = self.config.model.as_str();

        match self.config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        OracleError::Api(format!("failed to create Anthropic client: {e}"))
                    })?;
                prompt_text!(client, model, system_prompt, user_prompt, "Anthropic")
            }
            ProviderName::OpenAI => {
                let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
                if let Some(ref base_url) = self.config.base_url {
                    builder = builder.base_url(base_url);
                }
                let client: providers::openai::CompletionsClient = builder
                    .build()
                    .map_err(|e| OracleError::Api(format!("failed to create OpenAI client: {e}")))?;
                prompt_text!(client, model, system_prompt, user_prompt, "OpenAI")
            }
            ProviderName::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                prompt_text!(client, model, system_prompt, user_prompt, "Gemini")
            }
            ProviderName::OpenAICompatible => {
                let base_url = self.require_base_url()?;
                let client: providers::openai::CompletionsClient =
                    providers::openai::CompletionsClient::builder()
                        .api_key(api_key)
                        .base_url(base_url)
                        .build()
                        .map_err(|e| {
                            OracleError::Api(format!(
                                "failed to create OpenAI-compatible client: {e}"
                            ))
                        })?;
                prompt_text!(client, model, system_prompt, user_prompt, "OpenAI-compatible")
            }
        }
    }
}

#[async_trait]
impl ReasoningEngine for RigOracle {
    async fn classify(&self, query: &str, context: &str) -> Result<Intent, OracleError> {
        let system = "You classify repository questions into exactly one intent category. \
                      Respond with only the category label, nothing else. Categories: \
                      feature_finding (where/how is X implemented), \
                      overview (what does this project do, explain its structure), \
                      prioritization (which issues or pull requests matter most), \
                      suggestion (what should be done next), \
                      patch_request (write or propose a code change).";
        let user = format!("Repository context:\n{context}\n\nQuestion: {query}");
        let response = self.call_rig(system, &user).await?;
        parse_intent(&response)
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, OracleError> {
        let system = build_synthesis_system_prompt(request);
        let user = build_synthesis_user_prompt(request);
        self.call_rig(&system, &user).await
    }

    async fn tag_files(
        &self,
        batch: &[FileTagRequest],
    ) -> Result<Vec<Option<String>>, OracleError> {
        let system = "You write one short descriptive tag (at most 8 words) per file. \
                      Respond with a JSON array of strings, one per file, in order. \
                      Use null for files you cannot describe.";
        let mut user = String::from("Files:\n");
        for (i, file) in batch.iter().enumerate() {
            user.push_str(&format!("{}. {}\n```\n{}\n```\n", i + 1, file.path, file.snippet));
        }
        let response = self.call_rig(system, &user).await?;
        parse_tag_response(&response, batch.len())
    }
}

/// Parse a JSON string array (possibly fenced) into tags.
fn parse_tag_response(response: &str, expected: usize) -> Result<Vec<Option<String>>, OracleError> {
    let trimmed = strip_code_fence(response);
    let tags: Vec<Option<String>> = serde_json::from_str(trimmed)
        .map_err(|e| OracleError::Unparseable(format!("tag response: {e}")))?;
    if tags.len() != expected {
        return Err(OracleError::Unparseable(format!(
            "expected {expected} tags, got {}",
            tags.len()
        )));
    }
    Ok(tags)
}

/// Strip a surrounding ```...``` fence if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    inner.trim_end_matches('`').trim()
}

/// Mode-specific answer shaping instructions.
fn mode_instructions(mode: crate::models::Mode) -> &'static str {
    use crate::models::Mode;
    match mode {
        Mode::Explain => {
            "Provide a thorough explanation. Reference specific file paths and line numbers."
        }
        Mode::Locate => {
            "Identify exactly which files and line ranges implement the requested \
             functionality. Be concise: list locations first, brief explanation second."
        }
        Mode::Suggest => {
            "Suggest concrete next development steps. For each suggestion include an \
             impact label (high/medium/low) and an effort label (high/medium/low). \
             End your response with a 'Next Actions' list."
        }
        Mode::Patch => {
            "Propose a code change that addresses the request. Output the change as a \
             unified diff inside a ```diff fenced block after your explanation."
        }
    }
}

fn build_synthesis_system_prompt(request: &SynthesisRequest) -> String {
    format!(
        "You are a repository assistant answering from supplied evidence only.\n\
         \n\
         Citation rules:\n\
         - Every sentence asserting a fact about the repository must end with a \
         citation marker of the form [E:<id>] where <id> is one of the evidence ids \
         provided below.\n\
         - Never cite an id that is not in the evidence list.\n\
         - Never assert repository facts that the evidence does not support; if the \
         evidence is silent on something, say so.\n\
         \n\
         {}",
        mode_instructions(request.mode)
    )
}

fn build_synthesis_user_prompt(request: &SynthesisRequest) -> String {
    let mut prompt = String::new();
    if !request.session_context.is_empty() {
        prompt.push_str("Recent conversation history:\n");
        prompt.push_str(&request.session_context);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Evidence:\n\n");
    for block in &request.evidence {
        prompt.push_str(&format!(
            "[{}] {}\n```\n{}\n```\n\n",
            block.id, block.location, block.text
        ));
    }
    prompt.push_str(&format!("Question: {}", request.query));
    prompt
}

//! Lazy solution loading through the AI solving collaborator.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use practice_core::api::SolutionResponse;
use practice_core::model::{
    QuestionId, SessionId, SessionQuestion, Solution, SolutionStatus, UserId,
};

use crate::error::{SessionError, SolutionError};
use crate::sessions::{Applied, SessionService};

/// Produces worked solutions for session questions.
#[async_trait]
pub trait SolutionProvider: Send + Sync {
    /// Solve `question`.
    ///
    /// # Errors
    ///
    /// Returns `SolutionError` when the provider is unavailable or answers
    /// with nothing usable.
    async fn solve(&self, question: &SessionQuestion) -> Result<Solution, SolutionError>;
}

//
// ─── HTTP PROVIDER ─────────────────────────────────────────────────────────────
//

#[derive(Clone, Debug)]
pub struct SolutionProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl SolutionProviderConfig {
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("PRACTICE_AI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = env::var("PRACTICE_AI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());
        let model = env::var("PRACTICE_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

const SYSTEM_PROMPT: &str = "You solve school exercises. Reply with a JSON object \
{\"answer\": string, \"steps\": [string], \"tip\": string or null, \
\"confidence\": number between 0 and 1}.";

/// OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct HttpSolutionProvider {
    client: Client,
    config: Option<SolutionProviderConfig>,
}

impl HttpSolutionProvider {
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(SolutionProviderConfig::from_env())
    }

    #[must_use]
    pub fn new(config: Option<SolutionProviderConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

fn question_prompt(question: &SessionQuestion) -> String {
    let mut prompt = String::new();
    if let Some(context) = &question.hierarchy.parent_context {
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    if let Some(label) = &question.hierarchy.sub_label {
        prompt.push_str(label);
        prompt.push_str(") ");
    }
    prompt.push_str(&question.content.text);
    prompt
}

#[derive(Debug, Deserialize)]
struct SolutionPayload {
    answer: String,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    tip: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Accepts the JSON object asked for, optionally inside a code fence; any
/// other text is kept as a bare answer.
fn parse_solution(content: &str) -> Result<Solution, SolutionError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim);

    if let Ok(payload) = serde_json::from_str::<SolutionPayload>(unfenced) {
        if payload.answer.trim().is_empty() {
            return Err(SolutionError::EmptyResponse);
        }
        return Ok(Solution {
            answer: payload.answer,
            steps: payload.steps,
            tip: payload.tip.filter(|t| !t.trim().is_empty()),
            confidence: payload.confidence.map(|c| c.clamp(0.0, 1.0)),
        });
    }

    if unfenced.is_empty() {
        return Err(SolutionError::EmptyResponse);
    }
    Ok(Solution {
        answer: unfenced.to_string(),
        steps: Vec::new(),
        tip: None,
        confidence: None,
    })
}

#[async_trait]
impl SolutionProvider for HttpSolutionProvider {
    async fn solve(&self, question: &SessionQuestion) -> Result<Solution, SolutionError> {
        let config = self.config.as_ref().ok_or(SolutionError::Disabled)?;

        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: question_prompt(question),
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SolutionError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(SolutionError::EmptyResponse)?;

        parse_solution(&content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Loads solutions on demand and records their status on the session.
#[derive(Clone)]
pub struct SolutionService {
    sessions: SessionService,
    provider: Arc<dyn SolutionProvider>,
}

impl SolutionService {
    #[must_use]
    pub fn new(sessions: SessionService, provider: Arc<dyn SolutionProvider>) -> Self {
        Self { sessions, provider }
    }

    /// Return the solution of `question_id`, asking the provider when it is
    /// not loaded yet.
    ///
    /// Provider failures are recorded as `SolutionStatus::Error` and returned
    /// as such rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns `SolutionError::Session` for missing, foreign or unknown targets
    /// and storage failures.
    pub async fn load_solution(
        &self,
        id: SessionId,
        question_id: &QuestionId,
        user: UserId,
    ) -> Result<SolutionResponse, SolutionError> {
        let (_, question) = self
            .sessions
            .update_with_retry(id, user, |session, _now| {
                let question = session
                    .question_mut(question_id)
                    .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;
                if question.solution_status == SolutionStatus::Loaded && question.solution.is_some()
                {
                    return Ok(Applied::clean(question.clone()));
                }
                question.solution_status = SolutionStatus::Loading;
                Ok(Applied::dirty(question.clone()))
            })
            .await?;

        if question.solution_status == SolutionStatus::Loaded {
            debug!(session_id = %id, question_id = %question_id, "solution already loaded");
            return Ok(response(&question));
        }

        let result = self.provider.solve(&question).await;
        if let Err(err) = &result {
            warn!(
                session_id = %id,
                question_id = %question_id,
                error = %err,
                "solution provider failed"
            );
        }

        let (_, question) = self
            .sessions
            .update_with_retry(id, user, |session, _now| {
                let question = session
                    .question_mut(question_id)
                    .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;
                match &result {
                    Ok(solution) => question.set_solution(solution.clone()),
                    Err(_) => question.solution_status = SolutionStatus::Error,
                }
                Ok(Applied::dirty(question.clone()))
            })
            .await?;

        Ok(response(&question))
    }
}

fn response(question: &SessionQuestion) -> SolutionResponse {
    SolutionResponse {
        question_id: question.id.clone(),
        status: question.solution_status,
        solution: question.solution.clone(),
    }
}

// src/score/classifier.rs
//! Classifier collaborator: remote LLM behind a strict JSON response
//! contract, with a deterministic keyword fallback that never fails.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::{clamp01, ClassifierVerdict, RiskLevel};
use crate::retry::RetryPolicy;

/// Body text sent to the classifier is capped at this many chars.
pub const CLASSIFY_BODY_LIMIT: usize = 2000;

/// Textual context summarizing recent history, handed along with the
/// item so the classifier can weigh novelty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext {
    pub history_len: usize,
    pub avg_surprise: f32,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// May fail (remote outage, contract violation); the scorer then
    /// falls back to `fallback_verdict`.
    async fn classify(
        &self,
        title: &str,
        body: &str,
        context: Option<ClassifyContext>,
    ) -> Result<ClassifierVerdict>;
}

const SYSTEM_PROMPT: &str = "\
You are a financial risk analyst identifying black swan events. Following \
Nassim Taleb, a black swan is (1) outside regular expectation, (2) of \
extreme impact, and (3) retrospectively rationalized. Assess the event's \
unpredictability, its potential impact across financial markets, the \
economy and geopolitics, and whether it carries systemic risk. Reply with \
JSON only, exactly this shape: {\"is_black_swan\": boolean, \
\"confidence_score\": float 0.0-1.0, \"reasoning\": string, \
\"impact_areas\": array of strings, \"risk_level\": one of \
\"low\"|\"medium\"|\"high\"|\"extreme\"}";

/// Chat-completions classifier against any OpenAI-compatible endpoint.
pub struct LlmClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    policy: RetryPolicy,
}

impl LlmClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            policy,
        }
    }

    /// CLASSIFIER_API_URL / CLASSIFIER_API_KEY / CLASSIFIER_MODEL.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("CLASSIFIER_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let api_key = std::env::var("CLASSIFIER_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .context("CLASSIFIER_API_KEY or OPENAI_API_KEY missing")?;
        let model = std::env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self::new(endpoint, api_key, model, RetryPolicy::default().with_jitter()))
    }

    fn user_prompt(title: &str, body: &str, context: Option<ClassifyContext>) -> String {
        let body: String = body.chars().take(CLASSIFY_BODY_LIMIT).collect();
        let mut prompt = format!("News title: {title}\nNews content: {body}\n");
        if let Some(ctx) = context {
            prompt.push_str(&format!(
                "Context: {} recent items analyzed, average surprise {:.3}\n",
                ctx.history_len, ctx.avg_surprise
            ));
        }
        prompt.push_str("\nDecide whether this news describes a black swan event.");
        prompt
    }

    async fn call_once(&self, user: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: ResponseFormat<'a>,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.1,
            max_tokens: 1000,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("classifier request")?
            .error_for_status()
            .context("classifier non-2xx")?;

        let body: Resp = resp.json().await.context("classifier response body")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("classifier response contained no choices"))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        title: &str,
        body: &str,
        context: Option<ClassifyContext>,
    ) -> Result<ClassifierVerdict> {
        if self.api_key.is_empty() {
            bail!("classifier api key not configured");
        }
        let user = Self::user_prompt(title, body, context);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.call_once(&user).await {
                Ok(text) => return parse_verdict(&text),
                Err(e) if self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(attempt, error = %e, "classifier call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parse the classifier's reply against the response contract.
/// Required: `is_black_swan`, `confidence_score`, `reasoning`; the
/// rest defaults. Confidence is clamped into [0,1]. Any deviation is
/// an error so the caller can fall back.
pub fn parse_verdict(text: &str) -> Result<ClassifierVerdict> {
    let mut cleaned = text.trim();
    // Some models wrap JSON in a markdown fence despite the contract.
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    #[derive(Deserialize)]
    struct Raw {
        is_black_swan: Option<bool>,
        confidence_score: Option<f32>,
        reasoning: Option<String>,
        #[serde(default)]
        impact_areas: Vec<String>,
        #[serde(default)]
        risk_level: Option<RiskLevel>,
    }

    let raw: Raw = serde_json::from_str(cleaned).context("classifier reply is not valid JSON")?;
    let (Some(is_black_swan), Some(confidence), Some(reasoning)) =
        (raw.is_black_swan, raw.confidence_score, raw.reasoning)
    else {
        bail!("classifier reply missing required fields");
    };

    Ok(ClassifierVerdict {
        is_black_swan,
        confidence_score: clamp01(confidence),
        reasoning,
        impact_areas: raw.impact_areas,
        risk_level: raw.risk_level.unwrap_or_default(),
    })
}

const BLACK_SWAN_KEYWORDS: &[&str] = &[
    "black swan",
    "unexpected",
    "crisis",
    "collapse",
    "emergency",
    "market crash",
    "economic shock",
    "systemic risk",
    "tail risk",
    "geopolitical risk",
    "extreme event",
    "unforeseen",
];

/// Deterministic keyword heuristic used whenever the remote classifier
/// is unavailable or violates the contract. Never fails, always
/// complete.
pub fn fallback_verdict(title: &str, body: &str) -> ClassifierVerdict {
    let text = format!("{title} {body}").to_lowercase();
    let matches = BLACK_SWAN_KEYWORDS
        .iter()
        .filter(|kw| text.contains(*kw))
        .count();

    ClassifierVerdict {
        is_black_swan: matches > 2,
        confidence_score: (matches as f32 / 5.0).min(0.8),
        reasoning: "Fallback analysis based on keyword matching".to_string(),
        impact_areas: vec!["general".to_string()],
        risk_level: if matches > 1 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        },
    }
}

//! Reply generation over the Generative Language REST API.
//!
//! Thin collaborator: builds a `generateContent` request from the persona's
//! system instruction and the conversation history, and returns the raw
//! reply text (completion tags and mission headings included) for the
//! session engine to interpret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::persona::{AgentId, Persona};
use crate::session::ReplyGenerator;
use crate::state::{Message, Sender};

#[derive(Clone)]
pub struct GeminiClient {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

fn role_for(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Agent => "model",
    }
}

/// Map a transcript to request contents with the prompt as the final user
/// turn, exactly once.
///
/// The engine hands over the history with the just-submitted message already
/// appended; a trailing user entry matching the prompt is therefore dropped
/// before the prompt is re-added, so neither a double entry nor an omission
/// can reach the model.
fn build_contents(history: &[Message], prompt: &str) -> Vec<Content> {
    let mut past = history;
    if let Some(last) = past.last() {
        if last.sender == Sender::User && last.text == prompt {
            past = &past[..past.len() - 1];
        }
    }

    let mut contents: Vec<Content> = past
        .iter()
        .map(|message| Content {
            role: role_for(message.sender).to_string(),
            parts: vec![Part {
                text: message.text.clone(),
            }],
        })
        .collect();
    contents.push(Content {
        role: "user".to_string(),
        parts: vec![Part {
            text: prompt.to_string(),
        }],
    });
    contents
}

impl GeminiClient {
    pub fn new(api_url: String, api_key: String, model: String, temperature: f32) -> Self {
        Self {
            api_url,
            api_key,
            model,
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReplyGenerator for GeminiClient {
    async fn generate(
        &self,
        history: &[Message],
        agent_id: AgentId,
        day: u32,
        prompt: &str,
    ) -> Result<String> {
        let persona = Persona::get(agent_id);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );

        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: persona.system_instruction(day),
                }],
            },
            contents: build_contents(history, prompt),
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        tracing::debug!(
            "Requesting reply from {} for {} (day {})",
            self.model,
            agent_id,
            day
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send generation request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("Generation API returned error {}: {}", status, body);
        }

        let completion: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse generation response")?;

        let text = completion
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<String>()
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Empty response from model"))?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_duplicate_of_the_prompt_is_dropped() {
        let history = vec![
            Message::from_agent(AgentId::Jack, "What's the word?"),
            Message::from_user("mission accomplished"),
        ];
        let contents = build_contents(&history, "mission accomplished");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "model");
        assert_eq!(contents[1].role, "user");
        assert_eq!(contents[1].parts[0].text, "mission accomplished");
    }

    #[test]
    fn prompt_absent_from_history_is_still_appended() {
        let history = vec![Message::from_agent(AgentId::Jack, "Well?")];
        let contents = build_contents(&history, "report follows");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1].role, "user");
        assert_eq!(contents[1].parts[0].text, "report follows");
    }

    #[test]
    fn trailing_agent_message_is_never_dropped() {
        let history = vec![
            Message::from_user("ping"),
            Message::from_agent(AgentId::Jack, "ping"),
        ];
        let contents = build_contents(&history, "ping");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
        assert_eq!(contents[2].role, "user");
    }

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "be brief".to_string(),
                }],
            },
            contents: build_contents(&[], "hello"),
            generation_config: GenerationConfig { temperature: 0.9 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemInstruction").is_some());
        assert!(json.get("generationConfig").is_some());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
    }
}

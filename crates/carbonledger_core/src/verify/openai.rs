//! OpenAI-compatible vision classifier.
//!
//! Sends the prompt contract and the photo (as a base64 data URL) to a
//! chat-completions endpoint and returns the first choice's text.

use crate::config::ClassifierConfig;
use crate::verify::classifier::{Classifier, ClassifierError, ClassifierRequest};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-completions vision adapter.
pub struct OpenAiVisionClassifier {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiVisionClassifier {
    /// Creates an adapter whose HTTP timeout matches the verifier bound.
    ///
    /// # Errors
    /// - `Unavailable` when the API key is blank or the HTTP client cannot
    ///   be built.
    pub fn new(
        config: &ClassifierConfig,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClassifierError::Unavailable(
                "api key is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClassifierError::Unavailable(format!("http client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, request: &ClassifierRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: request.prompt.clone(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_url(&request.image),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

impl Classifier for OpenAiVisionClassifier {
    fn classifier_id(&self) -> &str {
        &self.model
    }

    fn classify(&self, request: &ClassifierRequest) -> Result<String, ClassifierError> {
        let response = self
            .client
            .post(self.chat_completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&self.request_body(request))
            .send()
            .map_err(|err| ClassifierError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Unavailable(format!(
                "endpoint answered with status {}",
                status.as_u16()
            )));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|err| ClassifierError::Transport(format!("invalid response body: {err}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ClassifierError::EmptyReply)
    }
}

/// Encodes image bytes as a JPEG data URL.
pub fn image_data_url(image: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(image))
}

#[cfg(test)]
mod tests {
    use super::{image_data_url, OpenAiVisionClassifier};
    use crate::config::ClassifierConfig;
    use crate::model::activity::ActivityKind;
    use crate::verify::classifier::{ClassifierError, ClassifierRequest};
    use std::time::Duration;

    fn classifier() -> OpenAiVisionClassifier {
        let config = ClassifierConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..ClassifierConfig::default()
        };
        OpenAiVisionClassifier::new(&config, "test-key", Duration::from_secs(1))
            .expect("classifier")
    }

    #[test]
    fn blank_api_key_is_unavailable() {
        let err = OpenAiVisionClassifier::new(
            &ClassifierConfig::default(),
            "  ",
            Duration::from_secs(1),
        )
        .err()
        .expect("blank key must fail");
        assert!(matches!(err, ClassifierError::Unavailable(_)));
    }

    #[test]
    fn url_strips_trailing_slash() {
        assert_eq!(
            classifier().chat_completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_carries_prompt_and_image_parts() {
        let request = ClassifierRequest {
            activity: ActivityKind::Tumbler,
            prompt: "is this a tumbler?".to_string(),
            image: vec![1, 2, 3],
        };
        let json = serde_json::to_value(classifier().request_body(&request)).expect("json");

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 300);
        let content = &json["messages"][0]["content"];
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "is this a tumbler?");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn data_url_uses_standard_base64() {
        assert_eq!(image_data_url(b"hi"), "data:image/jpeg;base64,aGk=");
    }
}

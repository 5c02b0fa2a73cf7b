use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::errors::ReviewRagError;

/// Client for Anthropic models served through Vertex AI.
pub struct LlmClient {
    endpoint: String,
    access_token: String,
    client: reqwest::Client,
}

impl LlmClient {
    /// Build from configuration. The project/region pair and an access token
    /// (`VERTEX_ACCESS_TOKEN`, e.g. from `gcloud auth print-access-token`)
    /// are required; their absence is a configuration error.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let project = config.llm.project.trim();
        if project.is_empty() {
            return Err(ReviewRagError::Config(
                "LLM project not set (config [llm].project or ANTHROPIC_VERTEX_PROJECT_ID)"
                    .to_string(),
            ));
        }

        let access_token = std::env::var("VERTEX_ACCESS_TOKEN").map_err(|_| {
            ReviewRagError::Config("VERTEX_ACCESS_TOKEN not set in environment".to_string())
        })?;

        let region = config.llm.region.trim();
        let host = if region == "global" {
            "aiplatform.googleapis.com".to_string()
        } else {
            format!("{region}-aiplatform.googleapis.com")
        };
        let endpoint = format!(
            "https://{host}/v1/projects/{project}/locations/{region}/publishers/anthropic/models/{model}:rawPredict",
            model = config.llm.model
        );

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ReviewRagError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            access_token,
            client,
        })
    }

    /// Send one user prompt and return the model's text response.
    pub async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            anthropic_version: &'a str,
            max_tokens: u32,
            messages: Vec<Message<'a>>,
        }

        #[derive(Deserialize)]
        struct Response {
            content: Vec<ContentBlock>,
        }

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: Option<String>,
        }

        debug!("Calling LLM ({} prompt chars)", prompt.len());

        let request = Request {
            anthropic_version: "vertex-2023-10-16",
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ReviewRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReviewRagError::Llm(format!(
                "LLM API error ({status}): {error_text}"
            )));
        }

        let result: Response = response
            .json()
            .await
            .map_err(|e| ReviewRagError::Llm(format!("Failed to parse response: {e}")))?;

        result
            .content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ReviewRagError::Llm("No text content in response".to_string()))
    }
}

//! Narrative and scenario generation backed by a completion client.

use super::config::LlmConfig;
use super::graph_model::GraphSnapshot;
use super::llm_client::{
    LlmClientError, LlmCompletionClient, LlmCompletionRequest, OpenAiChatCompletionClient,
};
use super::persist::GraphDocument;

pub const MAX_NARRATIVE_SENTENCES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeRequest {
    pub patient_zero: String,
    /// Impacted names in detection order, patient zero included.
    pub impacted: Vec<String>,
}

/// Explains a finished cascade in prose.
pub trait NarrativeGenerator {
    fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError>;
}

impl<N: NarrativeGenerator + ?Sized> NarrativeGenerator for Box<N> {
    fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        (**self).narrate(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrativeError {
    #[error("narrative generation is disabled")]
    Disabled,
    #[error("completion failed: {0}")]
    Client(#[from] LlmClientError),
    #[error("completion returned no text")]
    EmptyOutput,
    #[error("generated scenario is invalid: {message}")]
    InvalidScenario { message: String },
}

/// Used when no model endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNarrative;

impl NarrativeGenerator for DisabledNarrative {
    fn narrate(&self, _request: &NarrativeRequest) -> Result<String, NarrativeError> {
        Err(NarrativeError::Disabled)
    }
}

// ============================================================================
// LLM-backed narrative
// ============================================================================

#[derive(Debug, Clone)]
pub struct LlmNarrativeGenerator<C: LlmCompletionClient> {
    model: String,
    system_prompt: String,
    client: C,
}

impl LlmNarrativeGenerator<OpenAiChatCompletionClient> {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmClientError> {
        let client = OpenAiChatCompletionClient::from_config(config)?;
        Ok(Self::new(config, client))
    }
}

impl<C: LlmCompletionClient> LlmNarrativeGenerator<C> {
    pub fn new(config: &LlmConfig, client: C) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            client,
        }
    }

    fn user_prompt(request: &NarrativeRequest) -> String {
        format!(
            "The company \"{}\" has just gone bankrupt in the AI sector.\n\
             The following companies were hit by financial or technological contagion: {}.\n\n\
             Briefly explain (at most {} sentences) why these companies are affected \
             and what the potential systemic consequences for the AI market are.",
            request.patient_zero,
            request.impacted.join(", "),
            MAX_NARRATIVE_SENTENCES,
        )
    }
}

impl<C: LlmCompletionClient> NarrativeGenerator for LlmNarrativeGenerator<C> {
    fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        let completion = self.client.complete(&LlmCompletionRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            user_prompt: Self::user_prompt(request),
        })?;
        let text = completion.output.trim();
        if text.is_empty() {
            return Err(NarrativeError::EmptyOutput);
        }
        Ok(text.to_string())
    }
}

// ============================================================================
// LLM-backed scenario generation
// ============================================================================

const SCENARIO_PROMPT_RULES: &str = "\
Return a strict JSON object with two arrays: \"nodes\" and \"links\".
Each node: {\"id\": unique slug, \"name\": string, \"type\": one of \"Infrastructure\", \
\"Model Lab\", \"Cloud Provider\", \"Application\", \"VC / Holding\", \"valuation\": number \
(billions), \"cashReserve\": number (financial resilience, billions), \"currentHealth\": 100, \
\"status\": \"Healthy\", \"description\": short summary}.
Each link: {\"source\": node id, \"target\": node id, \"value\": number (stake in billions or \
intensity), \"type\": \"investment\" | \"partnership\" | \"dependency\"}.
Rules:
1. investment: source invests in target; if target fails, source loses its stake.
2. dependency: source depends on target (e.g. a model lab on a GPU vendor); if target fails, \
source is heavily hit.
3. Create between 5 and 10 nodes with plausible relationships.";

/// Builds a graph from a free-text description.
#[derive(Debug, Clone)]
pub struct LlmScenarioGenerator<C: LlmCompletionClient> {
    model: String,
    system_prompt: String,
    client: C,
}

impl LlmScenarioGenerator<OpenAiChatCompletionClient> {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmClientError> {
        let client = OpenAiChatCompletionClient::from_config(config)?;
        Ok(Self::new(config, client))
    }
}

impl<C: LlmCompletionClient> LlmScenarioGenerator<C> {
    pub fn new(config: &LlmConfig, client: C) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            client,
        }
    }

    fn user_prompt(description: &str) -> String {
        format!(
            "Generate a JSON network describing the financial ecosystem of AI companies for this \
             request: \"{}\".\n\
             If the request is unclear, build a realistic scenario with companies such as OpenAI, \
             Google, or Nvidia.\n\n{}",
            description.trim(),
            SCENARIO_PROMPT_RULES
        )
    }

    /// Returns a pristine snapshot; generated health and status values are discarded.
    pub fn generate(&self, description: &str) -> Result<GraphSnapshot, NarrativeError> {
        let completion = self.client.complete(&LlmCompletionRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            user_prompt: Self::user_prompt(description),
        })?;
        let snapshot = parse_generated_graph(&completion.output)?;
        tracing::info!(
            entities = snapshot.len(),
            relationships = snapshot.relationships().len(),
            "generated scenario graph"
        );
        Ok(snapshot)
    }
}

pub(crate) fn parse_generated_graph(output: &str) -> Result<GraphSnapshot, NarrativeError> {
    let json = extract_json_block(output).ok_or(NarrativeError::EmptyOutput)?;
    let document: GraphDocument =
        serde_json::from_str(json).map_err(|err| NarrativeError::InvalidScenario {
            message: err.to_string(),
        })?;
    if document.nodes.is_empty() {
        return Err(NarrativeError::InvalidScenario {
            message: "graph has no nodes".to_string(),
        });
    }
    let snapshot =
        GraphSnapshot::try_from(document).map_err(|err| NarrativeError::InvalidScenario {
            message: err.to_string(),
        })?;
    Ok(snapshot.reset())
}

fn extract_json_block(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    raw.get(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contagion::llm_client::LlmCompletionResult;
    use crate::contagion::types::HealthStatus;
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    struct MockClient {
        output: Option<String>,
        err: Option<LlmClientError>,
        last_prompt: RefCell<Option<String>>,
    }

    impl LlmCompletionClient for MockClient {
        fn complete(
            &self,
            request: &LlmCompletionRequest,
        ) -> Result<LlmCompletionResult, LlmClientError> {
            self.last_prompt.replace(Some(request.user_prompt.clone()));
            if let Some(err) = &self.err {
                return Err(err.clone());
            }
            Ok(LlmCompletionResult {
                output: self.output.clone().unwrap_or_default(),
            })
        }
    }

    fn base_config() -> LlmConfig {
        LlmConfig {
            model: "gpt-test".to_string(),
            base_url: "https://example.invalid/v1".to_string(),
            api_key: "test-key".to_string(),
            timeout_ms: 1000,
            system_prompt: "prompt".to_string(),
        }
    }

    fn request() -> NarrativeRequest {
        NarrativeRequest {
            patient_zero: "Nvidia".to_string(),
            impacted: vec!["Nvidia".to_string(), "OpenAI".to_string()],
        }
    }

    #[test]
    fn narrative_prompt_names_patient_zero_and_impacted() {
        let client = MockClient {
            output: Some("  Compute dried up.  ".to_string()),
            ..MockClient::default()
        };
        let generator = LlmNarrativeGenerator::new(&base_config(), client);
        let text = generator.narrate(&request()).unwrap();
        assert_eq!(text, "Compute dried up.");

        let prompt = generator.client.last_prompt.borrow().clone().unwrap();
        assert!(prompt.contains("\"Nvidia\""));
        assert!(prompt.contains("Nvidia, OpenAI"));
        assert!(prompt.contains("at most 3 sentences"));
    }

    #[test]
    fn blank_narrative_is_an_error() {
        let client = MockClient {
            output: Some("   ".to_string()),
            ..MockClient::default()
        };
        let generator = LlmNarrativeGenerator::new(&base_config(), client);
        assert_eq!(
            generator.narrate(&request()),
            Err(NarrativeError::EmptyOutput)
        );
    }

    #[test]
    fn client_failure_surfaces_as_narrative_error() {
        let client = MockClient {
            err: Some(LlmClientError::EmptyChoice),
            ..MockClient::default()
        };
        let generator = LlmNarrativeGenerator::new(&base_config(), client);
        assert_eq!(
            generator.narrate(&request()),
            Err(NarrativeError::Client(LlmClientError::EmptyChoice))
        );
    }

    #[test]
    fn disabled_narrative_always_fails() {
        assert_eq!(
            DisabledNarrative.narrate(&request()),
            Err(NarrativeError::Disabled)
        );
    }

    #[test]
    fn scenario_is_parsed_from_markdown_block_and_reset() {
        let output = r#"Here you go:
```json
{"nodes":[
  {"id":"a","name":"Alpha","type":"Model Lab","valuation":10,"cashReserve":2,"currentHealth":40,"status":"Stressed"},
  {"id":"b","name":"Beta","type":"GPU maker","valuation":50,"cashReserve":9}
 ],
 "links":[{"source":"a","target":"b","value":1,"type":"dependency"}]}
```"#;
        let client = MockClient {
            output: Some(output.to_string()),
            ..MockClient::default()
        };
        let generator = LlmScenarioGenerator::new(&base_config(), client);
        let snapshot = generator.generate("chip shortage").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.relationships().len(), 1);
        assert!(snapshot
            .entities()
            .iter()
            .all(|e| e.health == 100.0 && e.status == HealthStatus::Healthy));

        let prompt = generator.client.last_prompt.borrow().clone().unwrap();
        assert!(prompt.contains("chip shortage"));
    }

    #[test]
    fn scenario_without_nodes_is_rejected() {
        assert!(matches!(
            parse_generated_graph(r#"{"nodes":[],"links":[]}"#),
            Err(NarrativeError::InvalidScenario { .. })
        ));
        assert_eq!(
            parse_generated_graph("no json here"),
            Err(NarrativeError::EmptyOutput)
        );
    }

    #[test]
    fn scenario_with_duplicate_ids_is_rejected() {
        let raw = r#"{"nodes":[{"id":"a","name":"A"},{"id":"a","name":"B"}],"links":[]}"#;
        assert!(matches!(
            parse_generated_graph(raw),
            Err(NarrativeError::InvalidScenario { .. })
        ));
    }
}

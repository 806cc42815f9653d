//! Built-in graph scenarios (stable IDs).

use serde::{Deserialize, Serialize};

use super::graph_model::{Entity, GraphError, GraphSnapshot, Relationship};
use super::types::{EntityKind, RelationshipKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    AiEcosystem,
    InvestmentChain,
    DependencyFan,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::AiEcosystem => "ai_ecosystem",
            Scenario::InvestmentChain => "investment_chain",
            Scenario::DependencyFan => "dependency_fan",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "ai_ecosystem" | "ai-ecosystem" | "ecosystem" | "default" => {
                Some(Scenario::AiEcosystem)
            }
            "investment_chain" | "investment-chain" | "chain" => Some(Scenario::InvestmentChain),
            "dependency_fan" | "dependency-fan" | "fan" => Some(Scenario::DependencyFan),
            _ => None,
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["ai_ecosystem", "investment_chain", "dependency_fan"]
    }

    /// Entity whose failure makes the scenario interesting.
    pub fn default_trigger(&self) -> &'static str {
        match self {
            Scenario::AiEcosystem => "nvidia",
            Scenario::InvestmentChain => "chain-0",
            Scenario::DependencyFan => "foundry",
        }
    }

    pub fn build(&self) -> Result<GraphSnapshot, GraphError> {
        match self {
            Scenario::AiEcosystem => ai_ecosystem(),
            Scenario::InvestmentChain => investment_chain(),
            Scenario::DependencyFan => dependency_fan(),
        }
    }
}

fn ai_ecosystem() -> Result<GraphSnapshot, GraphError> {
    let entities = vec![
        Entity::new("nvidia", "Nvidia", EntityKind::Infrastructure)
            .with_financials(2200.0, 500.0)
            .with_description("Global GPU supplier."),
        Entity::new("microsoft", "Microsoft", EntityKind::CloudProvider)
            .with_financials(3000.0, 800.0)
            .with_description("Cloud giant and major shareholder."),
        Entity::new("openai", "OpenAI", EntityKind::ModelLab)
            .with_financials(80.0, 10.0)
            .with_description("Maker of GPT-4."),
        Entity::new("anthropic", "Anthropic", EntityKind::ModelLab)
            .with_financials(18.0, 5.0)
            .with_description("AI safety lab behind Claude."),
        Entity::new("google", "Google", EntityKind::CloudProvider)
            .with_financials(1700.0, 400.0)
            .with_description("DeepMind and TPU infrastructure."),
        Entity::new("amazon", "Amazon", EntityKind::CloudProvider)
            .with_financials(1800.0, 450.0)
            .with_description("AWS and Anthropic investor."),
        Entity::new("meta", "Meta", EntityKind::Application)
            .with_financials(1200.0, 300.0)
            .with_description("Open source Llama models."),
        Entity::new("tsmc", "TSMC", EntityKind::Infrastructure)
            .with_financials(600.0, 200.0)
            .with_description("Critical chip foundry."),
        Entity::new("mistral", "Mistral AI", EntityKind::ModelLab)
            .with_financials(2.0, 0.5)
            .with_description("European open-weight champion."),
        Entity::new("softbank", "Softbank", EntityKind::Investor)
            .with_financials(100.0, 30.0)
            .with_description("Major tech investor."),
    ];
    let relationships = vec![
        Relationship::investment("microsoft", "openai", 13.0),
        Relationship::new("openai", "nvidia", RelationshipKind::Dependency, 5.0),
        // compute cost
        Relationship::new("openai", "microsoft", RelationshipKind::Dependency, 4.0),
        Relationship::investment("amazon", "anthropic", 4.0),
        Relationship::investment("google", "anthropic", 2.0),
        // TPU and cloud usage
        Relationship::new("anthropic", "google", RelationshipKind::Dependency, 1.5),
        Relationship::new("nvidia", "tsmc", RelationshipKind::Dependency, 20.0),
        // chip purchases
        Relationship::new("microsoft", "nvidia", RelationshipKind::Dependency, 15.0),
        Relationship::new("google", "nvidia", RelationshipKind::Dependency, 10.0),
        Relationship::new("meta", "nvidia", RelationshipKind::Dependency, 12.0),
        Relationship::investment("softbank", "nvidia", 1.0),
        Relationship::investment("microsoft", "mistral", 0.2),
        Relationship::partnership("nvidia", "mistral", 0.1),
    ];
    GraphSnapshot::new(entities, relationships)
}

/// Six holdings, each owning a stake larger than its reserve in the previous one.
fn investment_chain() -> Result<GraphSnapshot, GraphError> {
    const LENGTH: usize = 6;
    let entities = (0..LENGTH)
        .map(|index| {
            Entity::new(
                format!("chain-{index}"),
                format!("Holding {index}"),
                EntityKind::Investor,
            )
            .with_financials(20.0, 2.0)
        })
        .collect();
    let relationships = (1..LENGTH)
        .map(|index| {
            Relationship::investment(format!("chain-{index}"), format!("chain-{}", index - 1), 3.0)
        })
        .collect();
    GraphSnapshot::new(entities, relationships)
}

/// One foundry with five dependents and a partner that is never hit.
fn dependency_fan() -> Result<GraphSnapshot, GraphError> {
    let mut entities = vec![Entity::new("foundry", "Foundry", EntityKind::Infrastructure)
        .with_financials(600.0, 200.0)
        .with_description("Sole supplier of advanced wafers.")];
    let mut relationships = Vec::new();
    let dependents = [
        ("lab-a", "Lab A", EntityKind::ModelLab),
        ("lab-b", "Lab B", EntityKind::ModelLab),
        ("cloud", "Cloud", EntityKind::CloudProvider),
        ("chip-designer", "Chip Designer", EntityKind::Infrastructure),
        ("assistant-app", "Assistant App", EntityKind::Application),
    ];
    for (id, name, kind) in dependents {
        entities.push(Entity::new(id, name, kind).with_financials(50.0, 10.0));
        relationships.push(Relationship::dependency(id, "foundry"));
    }
    entities.push(
        Entity::new("research-partner", "Research Partner", EntityKind::ModelLab)
            .with_financials(5.0, 1.0),
    );
    relationships.push(Relationship::partnership("research-partner", "foundry", 2.0));
    GraphSnapshot::new(entities, relationships)
}

//! Schema-constrained financial persona generation.
//!
//! The model output is accepted whole or rejected whole: any field
//! outside the schema (unknown type, oversized lists, score out of
//! range) fails the entire generation. No partial personas, no retry;
//! the caller surfaces a generation error and the client may re-request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::{AiError, CompletionRequest, StructuredCompletion};
use crate::prompts;

pub const MAX_STRENGTHS: usize = 3;
pub const MAX_IMPROVEMENTS: usize = 2;

/// The six persona archetypes. Wire form is French snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaKind {
    EconomePrudent,
    StrategeEquilibre,
    DynamiqueActif,
    InvestisseurAudacieux,
    TranquilleSerein,
    ProfilASurveiller,
}

impl PersonaKind {
    pub const ALL: [Self; 6] = [
        Self::EconomePrudent,
        Self::StrategeEquilibre,
        Self::DynamiqueActif,
        Self::InvestisseurAudacieux,
        Self::TranquilleSerein,
        Self::ProfilASurveiller,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            Self::EconomePrudent => "🦉",
            Self::StrategeEquilibre => "🦊",
            Self::DynamiqueActif => "🐆",
            Self::InvestisseurAudacieux => "🦅",
            Self::TranquilleSerein => "🐢",
            Self::ProfilASurveiller => "⚠️",
        }
    }

    pub fn archetype(self) -> &'static str {
        match self {
            Self::EconomePrudent => "L'Économe prudent",
            Self::StrategeEquilibre => "Le Stratège équilibré",
            Self::DynamiqueActif => "Le Dynamique actif",
            Self::InvestisseurAudacieux => "L'Investisseur audacieux",
            Self::TranquilleSerein => "Le Tranquille serein",
            Self::ProfilASurveiller => "Le Profil à surveiller",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

/// A validated persona, as served to the client (camelCase on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaResult {
    #[serde(rename = "type")]
    pub kind: PersonaKind,
    pub emoji: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub risk_level: Level,
    pub activity_level: Level,
    pub savings_score: i64,
}

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error(transparent)]
    Model(#[from] AiError),
    #[error("persona violates schema: {0}")]
    Schema(String),
}

impl PersonaResult {
    /// Bounds the deserializer cannot express. Enum membership and field
    /// presence are already enforced by serde.
    pub fn validate(&self) -> Result<(), PersonaError> {
        if self.strengths.len() > MAX_STRENGTHS {
            return Err(PersonaError::Schema(format!(
                "{} strengths, at most {MAX_STRENGTHS} allowed",
                self.strengths.len()
            )));
        }
        if self.improvements.len() > MAX_IMPROVEMENTS {
            return Err(PersonaError::Schema(format!(
                "{} improvements, at most {MAX_IMPROVEMENTS} allowed",
                self.improvements.len()
            )));
        }
        if !(0..=100).contains(&self.savings_score) {
            return Err(PersonaError::Schema(format!(
                "savingsScore {} outside 0..=100",
                self.savings_score
            )));
        }
        Ok(())
    }
}

/// Run one JSON-mode generation over the condensed context and validate
/// the result against the persona schema.
pub async fn generate_persona(
    model: &dyn StructuredCompletion,
    context: &str,
) -> Result<PersonaResult, PersonaError> {
    let request = CompletionRequest {
        system: prompts::PERSONA_SYSTEM_PROMPT.to_string(),
        prompt: prompts::persona_prompt(context),
    };
    let value = model.complete_json(&request).await?;
    let persona: PersonaResult =
        serde_json::from_value(value).map_err(|e| PersonaError::Schema(e.to_string()))?;
    persona.validate()?;
    Ok(persona)
}

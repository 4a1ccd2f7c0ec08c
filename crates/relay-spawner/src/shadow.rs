//! Trigger-set resolution for primary/shadow worker pairs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowTrigger {
    CodeWritten,
    ReviewRequest,
    ExplicitAsk,
    SessionEnd,
    AllMessages,
}

/// Named bundles of triggers a shadow can be pointed at instead of spelling
/// out an explicit trigger list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePreset {
    Reviewer,
    Auditor,
    Active,
}

impl RolePreset {
    pub fn triggers(&self) -> Vec<ShadowTrigger> {
        match self {
            RolePreset::Reviewer => vec![
                ShadowTrigger::CodeWritten,
                ShadowTrigger::ReviewRequest,
                ShadowTrigger::ExplicitAsk,
            ],
            RolePreset::Auditor => vec![ShadowTrigger::SessionEnd, ShadowTrigger::ExplicitAsk],
            RolePreset::Active => vec![ShadowTrigger::AllMessages],
        }
    }
}

/// Folds default -> role preset -> explicit override, left to right. An
/// explicit override always wins outright rather than merging with the preset.
pub fn resolve_triggers(
    role_preset: Option<RolePreset>,
    explicit_override: Option<Vec<ShadowTrigger>>,
) -> Vec<ShadowTrigger> {
    let mut triggers = vec![ShadowTrigger::ExplicitAsk];
    if let Some(preset) = role_preset {
        triggers = preset.triggers();
    }
    if let Some(overrides) = explicit_override {
        triggers = overrides;
    }
    triggers
}

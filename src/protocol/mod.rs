use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classifier::PhraseMatch;

/// Terminal state of one renewal run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The service reports the renewal is rate limited; a successful no-op.
    Cooldown,
    Succeeded,
    /// The page changed in an unrecognized way. Needs a human look.
    Unconfirmed,
    Failed(String),
}

impl Outcome {
    /// `Unconfirmed` and `Failed` should prompt inspection of diagnostics.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Unconfirmed | Self::Failed(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded | Self::Cooldown => 0,
            Self::Failed(_) => 1,
            Self::Unconfirmed => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cooldown => "cooldown",
            Self::Succeeded => "succeeded",
            Self::Unconfirmed => "unconfirmed",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// How the submit control ended up being activated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Activation {
    /// A configured strategy found a visible control with an action keyword.
    Strategy { index: usize, selector: String },
    /// The last-resort scan over every clickable control in the page.
    BroadPass {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub target_url: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_ms: u64,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_strategy: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<PhraseMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markup_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_excerpt: Option<String>,
    /// Page markup captured when the input could not be found.
    #[serde(skip)]
    pub debug_markup: Option<String>,
}

impl RunReport {
    /// True once the control was (or may have been) activated.
    pub fn activated(&self) -> bool {
        self.activation.is_some()
    }

    /// A failed run may be repeated only if nothing was submitted yet.
    pub fn is_retryable(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_)) && !self.activated()
    }
}

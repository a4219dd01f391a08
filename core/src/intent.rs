//! Intent classification as an ordered rule table.
//!
//! Rules are evaluated top to bottom and the first match wins, so the order of
//! [`RULES`] is the tie-break policy. Classification is a pure function of the
//! message and the context.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::extract::{self, Extraction};
use crate::session::SessionContext;
use crate::state::ConversationState;
use crate::utterance::Utterance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Greeting,
    TicketInquiry,
    UpgradeRequest,
    PricingInquiry,
    FeatureInquiry,
    UpgradeSelection,
    Affirmation,
    Decline,
    Help,
    Unknown,
}

impl Intent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::TicketInquiry => "TICKET_INQUIRY",
            Self::UpgradeRequest => "UPGRADE_REQUEST",
            Self::PricingInquiry => "PRICING_INQUIRY",
            Self::FeatureInquiry => "FEATURE_INQUIRY",
            Self::UpgradeSelection => "UPGRADE_SELECTION",
            Self::Affirmation => "AFFIRMATION",
            Self::Decline => "DECLINE",
            Self::Help => "HELP",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Intents answered from fixed templates rather than the reasoning delegate.
    pub const fn is_transactional(self) -> bool {
        matches!(
            self,
            Self::UpgradeSelection | Self::Affirmation | Self::PricingInquiry
        )
    }
}

const AFFIRMATION_TOKENS: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "sure",
    "okay",
    "ok",
    "sounds good",
    "interested",
    "tell me more",
    "please do",
    "go ahead",
    "confirm",
];
const DECLINE_TOKENS: &[&str] = &["no", "not interested", "maybe later", "not now", "no thanks"];
const PRICING_TOKENS: &[&str] = &[
    "price",
    "prices",
    "pricing",
    "cost",
    "costs",
    "how much",
    "expensive",
    "cheap",
    "fee",
];
const UPGRADE_TOKENS: &[&str] = &[
    "upgrade",
    "upgrades",
    "upgrading",
    "premium",
    "vip",
    "better",
    "enhance",
    "options",
    "tiers",
    "recommend",
    "suggest",
    "best",
    "which upgrade",
];
const FEATURE_TOKENS: &[&str] = &[
    "features",
    "feature",
    "benefits",
    "includes",
    "include",
    "included",
    "what do i get",
    "perks",
];
const TICKET_TOKENS: &[&str] = &["ticket", "booking", "reservation", "ticket id"];
const GREETING_TOKENS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
];
const HELP_TOKENS: &[&str] = &["help", "what can you do", "assist", "support"];

/// Everything a rule may look at.
pub struct Signals<'a> {
    utterance: Utterance,
    context: &'a SessionContext,
    extraction: &'a Extraction,
    state: ConversationState,
}

pub struct Rule {
    pub intent: Intent,
    matches: fn(&Signals<'_>) -> bool,
}

/// "Yes, the VIP Package" while the VIP Package awaits confirmation.
fn confirms_pending(s: &Signals<'_>) -> bool {
    s.state == ConversationState::UpgradeSelected
        && s.extraction.restates_pending
        && s.utterance.contains_any_affirmed(AFFIRMATION_TOKENS)
}

/// The classification order.
pub static RULES: [Rule; 9] = [
    Rule {
        intent: Intent::UpgradeSelection,
        matches: |s| {
            s.extraction.selection.is_some()
                && s.state != ConversationState::Confirmed
                && !confirms_pending(s)
        },
    },
    Rule {
        intent: Intent::Affirmation,
        matches: |s| {
            !s.context.upgrade_options.is_empty()
                && s.utterance.contains_any_affirmed(AFFIRMATION_TOKENS)
        },
    },
    Rule {
        intent: Intent::Decline,
        matches: |s| s.utterance.contains_any(DECLINE_TOKENS),
    },
    // Pricing before upgrade: "how much is the vip upgrade" is a pricing question.
    Rule {
        intent: Intent::PricingInquiry,
        matches: |s| s.utterance.contains_any(PRICING_TOKENS),
    },
    Rule {
        intent: Intent::UpgradeRequest,
        matches: |s| s.utterance.contains_any(UPGRADE_TOKENS),
    },
    Rule {
        intent: Intent::FeatureInquiry,
        matches: |s| s.utterance.contains_any(FEATURE_TOKENS),
    },
    Rule {
        intent: Intent::TicketInquiry,
        matches: |s| {
            s.utterance.contains_any(TICKET_TOKENS)
                || s.extraction.ticket_in_message()
                || s.extraction.malformed_ticket_reference
        },
    },
    Rule {
        intent: Intent::Greeting,
        matches: |s| s.utterance.contains_any(GREETING_TOKENS),
    },
    Rule {
        intent: Intent::Help,
        matches: |s| s.utterance.contains_any(HELP_TOKENS),
    },
];

/// Classify with an extraction the caller already ran.
pub fn classify_with(
    message: &str,
    context: &SessionContext,
    extraction: &Extraction,
    state: ConversationState,
) -> Intent {
    if extraction.malformed_selection {
        return Intent::Unknown;
    }
    let signals = Signals {
        utterance: Utterance::new(message),
        context,
        extraction,
        state,
    };
    RULES
        .iter()
        .find(|rule| (rule.matches)(&signals))
        .map_or(Intent::Unknown, |rule| rule.intent)
}

/// Assign exactly one intent to a message.
pub fn classify(message: &str, context: &SessionContext) -> Intent {
    let extraction = extract::extract(message, context, None);
    classify_with(
        message,
        context,
        &extraction,
        ConversationState::reconcile(context),
    )
}

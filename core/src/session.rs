use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::state::ConversationState;

/// Who wrote a turn. The web client historically labels assistant turns `ai`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Customer,
    #[serde(alias = "ai")]
    Assistant,
}

/// One message in the conversation. Turns are append-only and never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Turn {
    pub sender: Sender,
    pub content: String,
}

impl Turn {
    pub fn customer(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Customer,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
        }
    }
}

/// An upgrade tier as disclosed to the customer.
///
/// Options are produced by the validation service or the standard catalog,
/// never by the customer. A selection is only honored when it names an option
/// that was disclosed earlier in the same session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UpgradeOption {
    /// Short stable token ("standard", "premium", "vip")
    pub id: String,
    /// Display name ("Premium Experience")
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Ticket facts recorded from the last successful validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketProfile {
    pub ticket_id: String,
    pub current_tier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
}

/// Cross-turn state. The core keeps nothing between calls: the transport
/// hands this back on every turn and stores whatever `handle_turn` returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    /// True only after a successful validation of `ticket_id` in this session
    #[serde(default)]
    pub has_ticket_info: bool,
    /// Chosen by the customer, not yet confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_upgrade: Option<UpgradeOption>,
    /// Options most recently disclosed to the customer, in presentation order
    #[serde(default, deserialize_with = "null_as_default")]
    pub upgrade_options: Vec<UpgradeOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConversationState>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub turns: Vec<Turn>,
}

impl SessionContext {
    /// Whether upgrade options may be disclosed for the referenced ticket.
    pub fn is_validated(&self) -> bool {
        self.has_ticket_info && self.ticket_id.is_some()
    }

    /// Look up a disclosed option by id (case-insensitive).
    pub fn disclosed_option(&self, option_id: &str) -> Option<&UpgradeOption> {
        self.upgrade_options
            .iter()
            .find(|option| option.id.eq_ignore_ascii_case(option_id.trim()))
    }

    /// Forget everything learned about the current ticket.
    pub fn clear_ticket_facts(&mut self) {
        self.has_ticket_info = false;
        self.ticket = None;
        self.upgrade_options.clear();
        self.selected_upgrade = None;
    }

    /// The last `limit` turns, oldest first.
    pub fn recent_turns(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}

/// The sole output of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub text: String,
    pub show_upgrade_buttons: bool,
    /// Empty unless `show_upgrade_buttons` is set
    pub upgrade_options: Vec<UpgradeOption>,
}

impl ResponseEnvelope {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            show_upgrade_buttons: false,
            upgrade_options: Vec::new(),
        }
    }

    pub fn with_options(text: impl Into<String>, options: Vec<UpgradeOption>) -> Self {
        let show = !options.is_empty();
        Self {
            text: text.into(),
            show_upgrade_buttons: show,
            upgrade_options: options,
        }
    }

    /// Drop any disclosed options, keeping the text.
    pub fn withhold_options(&mut self) {
        self.show_upgrade_buttons = false;
        self.upgrade_options.clear();
    }
}

/// Structured UI action that may accompany a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiAction {
    /// The customer clicked one of the disclosed upgrade buttons
    UpgradeSelected {
        #[serde(rename = "optionId")]
        option_id: String,
    },
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

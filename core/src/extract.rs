//! Entity extraction: ticket identifiers and upgrade selections.
//!
//! Extraction never calls out and never decides whether a ticket is valid;
//! a well-formed id that the backend does not know is rejected by the gate.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::{Sender, SessionContext, UiAction, UpgradeOption};
use crate::state::ConversationState;
use crate::utterance::Utterance;

static TICKET_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("valid ticket id regex")
});
static TICKET_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{4,}(?:-[0-9a-f]+)+\b").expect("valid ticket-like regex")
});

const MIN_TICKET_LIKE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionSource {
    /// Found in the current message
    Message,
    /// Recovered from an earlier turn
    History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketMention {
    pub ticket_id: String,
    pub source: MentionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// A button click sent as a structured action
    Action,
    /// The message named a disclosed option
    Message,
    /// The client put a fresh selection into the context
    Context,
}

/// Facts pulled out of one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub ticket: Option<TicketMention>,
    /// Always a member of the disclosed options
    pub selection: Option<UpgradeOption>,
    pub selection_source: Option<SelectionSource>,
    /// The message resembles a ticket id but is not one
    pub malformed_ticket_reference: bool,
    /// A selection named an option that was never disclosed
    pub malformed_selection: bool,
    /// The selection is the one already pending from an earlier turn
    pub restates_pending: bool,
}

impl Extraction {
    pub fn ticket_in_message(&self) -> bool {
        matches!(
            self.ticket,
            Some(TicketMention {
                source: MentionSource::Message,
                ..
            })
        )
    }
}

/// First canonical ticket id in `text`, lowercased.
pub fn find_ticket_id(text: &str) -> Option<String> {
    TICKET_ID_RE
        .find(text)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Text that resembles a ticket id without matching the canonical shape,
/// e.g. a truncated or mistyped id.
pub fn looks_like_ticket_reference(text: &str) -> bool {
    if TICKET_ID_RE.is_match(text) {
        return false;
    }
    TICKET_LIKE_RE.find_iter(text).any(|m| {
        let token = m.as_str();
        token.len() >= MIN_TICKET_LIKE_LEN && token.chars().any(|c| c.is_ascii_digit())
    })
}

fn ticket_mention(message: &str, context: &SessionContext) -> Option<TicketMention> {
    if let Some(ticket_id) = find_ticket_id(message) {
        return Some(TicketMention {
            ticket_id,
            source: MentionSource::Message,
        });
    }
    context
        .turns
        .iter()
        .rev()
        .filter(|turn| turn.sender == Sender::Customer)
        .find_map(|turn| find_ticket_id(&turn.content))
        .map(|ticket_id| TicketMention {
            ticket_id,
            source: MentionSource::History,
        })
}

/// First disclosed option named by the message, in presentation order.
pub fn match_disclosed_option<'a>(
    message: &str,
    options: &'a [UpgradeOption],
) -> Option<&'a UpgradeOption> {
    let utterance = Utterance::new(message);
    options.iter().find(|option| {
        utterance.contains_affirmed(&option.id) || utterance.contains_affirmed(&option.name)
    })
}

fn selection(
    message: &str,
    context: &SessionContext,
    action: Option<&UiAction>,
    extraction: &mut Extraction,
) {
    let pending = context.selected_upgrade.as_ref().map(|option| option.id.as_str());

    if let Some(UiAction::UpgradeSelected { option_id }) = action {
        match context.disclosed_option(option_id) {
            Some(option) => {
                extraction.restates_pending = pending == Some(option.id.as_str());
                extraction.selection = Some(option.clone());
                extraction.selection_source = Some(SelectionSource::Action);
            }
            None => extraction.malformed_selection = true,
        }
        return;
    }

    if let Some(option) = match_disclosed_option(message, &context.upgrade_options) {
        extraction.restates_pending = pending == Some(option.id.as_str());
        extraction.selection = Some(option.clone());
        extraction.selection_source = Some(SelectionSource::Message);
        return;
    }

    let Some(supplied) = &context.selected_upgrade else {
        return;
    };
    match context.disclosed_option(&supplied.id) {
        None => extraction.malformed_selection = true,
        // A pending selection from an earlier turn is not a new one.
        Some(option) if context.state == Some(ConversationState::OptionsPresented) => {
            extraction.selection = Some(option.clone());
            extraction.selection_source = Some(SelectionSource::Context);
        }
        Some(_) => {}
    }
}

/// Pull the ticket id and upgrade selection out of the current turn.
pub fn extract(message: &str, context: &SessionContext, action: Option<&UiAction>) -> Extraction {
    let mut extraction = Extraction {
        ticket: ticket_mention(message, context),
        ..Extraction::default()
    };
    if extraction.ticket.is_none() {
        extraction.malformed_ticket_reference = looks_like_ticket_reference(message);
    }
    selection(message, context, action, &mut extraction);
    extraction
}

/// Extract and fold the results into the context.
///
/// Only `ticket_id` and `selected_upgrade` are touched; a selection that was
/// never disclosed is dropped rather than carried forward.
pub fn enrich(
    message: &str,
    mut context: SessionContext,
    action: Option<&UiAction>,
) -> (SessionContext, Extraction) {
    let extraction = extract(message, &context, action);
    if let Some(mention) = &extraction.ticket {
        context.ticket_id = Some(mention.ticket_id.clone());
    }
    if let Some(option) = &extraction.selection {
        context.selected_upgrade = Some(option.clone());
    } else if extraction.malformed_selection {
        context.selected_upgrade = None;
    }
    (context, extraction)
}

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::session::SessionContext;

/// Where a session stands in the upgrade journey.
///
/// `OptionsPresented` is only reachable through `TicketValidated`, and
/// `Confirmed` only through `UpgradeSelected`. `Confirmed` is terminal;
/// `Rejected` only leaves on a new candidate ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Init,
    AwaitingTicket,
    TicketValidated,
    OptionsPresented,
    UpgradeSelected,
    Confirmed,
    Rejected,
}

/// Things that happen during a turn and may move the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    TurnStarted,
    TicketCandidate,
    ValidationPassed,
    ValidationRejected,
    ValidationUnavailable,
    OptionsDisclosed,
    OptionSelected,
    SelectionConfirmed,
    SelectionWithdrawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: ConversationState,
    pub event: SessionEvent,
}

impl ConversationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::AwaitingTicket => "AWAITING_TICKET",
            Self::TicketValidated => "TICKET_VALIDATED",
            Self::OptionsPresented => "OPTIONS_PRESENTED",
            Self::UpgradeSelected => "UPGRADE_SELECTED",
            Self::Confirmed => "CONFIRMED",
            Self::Rejected => "REJECTED",
        }
    }

    /// States that only exist after a successful validation.
    pub const fn requires_validation(self) -> bool {
        matches!(
            self,
            Self::TicketValidated | Self::OptionsPresented | Self::UpgradeSelected | Self::Confirmed
        )
    }

    /// States from which option buttons may be shown.
    pub const fn allows_disclosure(self) -> bool {
        matches!(
            self,
            Self::TicketValidated | Self::OptionsPresented | Self::UpgradeSelected
        )
    }

    pub fn transition(self, event: SessionEvent) -> Result<Self, TransitionError> {
        use ConversationState::*;
        use SessionEvent::*;

        let next = match (self, event) {
            (Init, TurnStarted) => AwaitingTicket,
            (state, TurnStarted) => state,

            (Init | AwaitingTicket | Rejected, TicketCandidate) => AwaitingTicket,
            (TicketValidated | OptionsPresented | UpgradeSelected, TicketCandidate) => {
                AwaitingTicket
            }

            (AwaitingTicket, ValidationPassed) => TicketValidated,
            (AwaitingTicket, ValidationRejected) => Rejected,
            (AwaitingTicket, ValidationUnavailable) => AwaitingTicket,

            (TicketValidated | OptionsPresented | UpgradeSelected, OptionsDisclosed) => {
                OptionsPresented
            }
            (OptionsPresented | UpgradeSelected, OptionSelected) => UpgradeSelected,
            (UpgradeSelected, SelectionConfirmed) => Confirmed,
            (UpgradeSelected, SelectionWithdrawn) => OptionsPresented,

            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(next)
    }

    /// Derive a state for a context that arrived without one.
    pub fn infer(ctx: &SessionContext) -> Self {
        if ctx.is_validated() {
            if ctx.upgrade_options.is_empty() {
                Self::TicketValidated
            } else if ctx.selected_upgrade.is_some() {
                Self::UpgradeSelected
            } else {
                Self::OptionsPresented
            }
        } else if ctx.ticket_id.is_some() || !ctx.turns.is_empty() {
            Self::AwaitingTicket
        } else {
            Self::Init
        }
    }

    /// The state a turn starts from: the supplied one, unless it claims a
    /// validation the context cannot back up.
    pub fn reconcile(ctx: &SessionContext) -> Self {
        let Some(supplied) = ctx.state else {
            return Self::infer(ctx);
        };
        if supplied.requires_validation() && !ctx.is_validated() {
            return Self::AwaitingTicket;
        }
        match supplied {
            Self::UpgradeSelected if ctx.selected_upgrade.is_none() => {
                if ctx.upgrade_options.is_empty() {
                    Self::TicketValidated
                } else {
                    Self::OptionsPresented
                }
            }
            Self::OptionsPresented if ctx.upgrade_options.is_empty() => Self::TicketValidated,
            other => other,
        }
    }
}

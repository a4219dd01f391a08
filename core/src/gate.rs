//! Validation gate: the only place that may set `has_ticket_info`.

use std::sync::Arc;
use std::time::Duration;

use crate::delegate::{TicketValidator, ValidationOutcome};
use crate::error::UpstreamError;
use crate::session::{SessionContext, TicketProfile};

pub const NO_TICKET_REASON: &str = "no ticket provided";
pub const NO_UPGRADES_REASON: &str = "no upgrades are currently available for this ticket";
pub const UNAVAILABLE_REASON: &str = "ticket validation service unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Validated,
    /// Business rejection: not found or not eligible
    Rejected,
    /// The validator failed or timed out; nothing was learned
    Unreachable,
    MissingTicket,
}

impl GateStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::Unreachable => "unreachable",
            Self::MissingTicket => "missing_ticket",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub status: GateStatus,
    pub outcome: ValidationOutcome,
    pub ticket_id: Option<String>,
}

#[derive(Clone)]
pub struct ValidationGate {
    validator: Arc<dyn TicketValidator>,
    timeout: Duration,
}

impl ValidationGate {
    pub fn new(validator: Arc<dyn TicketValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    async fn call(&self, ticket_id: &str) -> Result<ValidationOutcome, UpstreamError> {
        match tokio::time::timeout(self.timeout, self.validator.validate(ticket_id, None)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout),
        }
    }

    /// Validate `ticket_id` once and record the result in the context.
    ///
    /// Fails closed: anything short of an eligible answer with at least one
    /// upgrade leaves the context unvalidated with no options.
    pub async fn check_and_record(
        &self,
        ticket_id: Option<&str>,
        mut context: SessionContext,
    ) -> (GateDecision, SessionContext) {
        let Some(ticket_id) = ticket_id else {
            context.has_ticket_info = false;
            let decision = GateDecision {
                status: GateStatus::MissingTicket,
                outcome: ValidationOutcome::rejected(NO_TICKET_REASON),
                ticket_id: None,
            };
            return (decision, context);
        };

        context.ticket_id = Some(ticket_id.to_string());
        let (status, outcome) = match self.call(ticket_id).await {
            Ok(outcome) if outcome.eligible && !outcome.available_upgrades.is_empty() => {
                (GateStatus::Validated, outcome)
            }
            Ok(outcome) if outcome.eligible => {
                let mut outcome = outcome;
                outcome.eligible = false;
                outcome.reason = NO_UPGRADES_REASON.to_string();
                (GateStatus::Rejected, outcome)
            }
            Ok(outcome) => (GateStatus::Rejected, outcome),
            Err(err) => {
                tracing::warn!(ticket_id, error = %err, "ticket validation unavailable");
                (
                    GateStatus::Unreachable,
                    ValidationOutcome::rejected(UNAVAILABLE_REASON),
                )
            }
        };

        if status == GateStatus::Validated {
            context.has_ticket_info = true;
            context.upgrade_options = outcome.available_upgrades.clone();
            context.selected_upgrade = None;
            context.ticket = Some(TicketProfile {
                ticket_id: ticket_id.to_string(),
                current_tier: if outcome.current_tier.is_empty() {
                    "standard".to_string()
                } else {
                    outcome.current_tier.clone()
                },
                original_price: outcome.original_price,
            });
        } else {
            context.clear_ticket_facts();
        }

        tracing::info!(
            ticket_id,
            status = status.as_str(),
            reason = %outcome.reason,
            "ticket validation recorded"
        );
        let decision = GateDecision {
            status,
            outcome,
            ticket_id: Some(ticket_id.to_string()),
        };
        (decision, context)
    }
}

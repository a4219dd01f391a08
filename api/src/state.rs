use std::sync::Arc;

use concierge_core::reference::{OfflineReasoning, ReferenceError, TicketRegistry};
use concierge_core::{
    Collaborators, DelegateSettings, Orchestrator, PricingService, ReasoningDelegate,
    RecommendationService, TicketValidator,
};

use crate::backend::{ReasoningClient, TicketServiceClient};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub tickets: Arc<dyn TicketValidator>,
    pub pricing: Arc<dyn PricingService>,
    pub recommendations: Arc<dyn RecommendationService>,
}

impl AppState {
    pub fn new(collaborators: Collaborators, settings: DelegateSettings) -> Self {
        let orchestrator = Orchestrator::from_collaborators(&collaborators, settings);
        Self {
            orchestrator,
            tickets: collaborators.tickets,
            pricing: collaborators.pricing,
            recommendations: collaborators.recommendations,
        }
    }

    /// In-process reference services over the given registry.
    pub fn reference(registry: TicketRegistry, settings: DelegateSettings) -> Self {
        Self::new(Collaborators::reference(registry), settings)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ReferenceError> {
        let settings = config.delegate;

        let reasoning: Arc<dyn ReasoningDelegate> = match &config.reasoning_url {
            Some(url) => {
                tracing::info!(url = %url, "using remote reasoning delegate");
                Arc::new(ReasoningClient::new(url.clone(), settings.timeout))
            }
            None => {
                tracing::info!("no reasoning delegate configured, replies come from templates");
                Arc::new(OfflineReasoning)
            }
        };

        if let Some(url) = &config.ticket_service_url {
            tracing::info!(url = %url, "using remote ticket service");
            let remote = Arc::new(TicketServiceClient::new(url.clone(), settings.timeout));
            let collaborators = Collaborators {
                tickets: remote.clone(),
                pricing: remote.clone(),
                recommendations: remote,
                reasoning,
            };
            return Ok(Self::new(collaborators, settings));
        }

        let registry = match &config.tickets_file {
            Some(path) => TicketRegistry::from_path(path)?,
            None => TicketRegistry::demo(),
        };
        tracing::info!(tickets = registry.len(), "using in-process ticket registry");
        let collaborators = Collaborators {
            reasoning,
            ..Collaborators::reference(registry)
        };
        Ok(Self::new(collaborators, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_core::SessionContext;
    use concierge_core::catalog::EXAMPLE_TICKET_ID;

    #[tokio::test]
    async fn reference_state_routes_share_the_orchestrators_registry() {
        let state = AppState::reference(TicketRegistry::demo(), DelegateSettings::default());
        let outcome = state.tickets.validate(EXAMPLE_TICKET_ID, None).await.unwrap();
        assert!(outcome.eligible);

        let (envelope, ctx) = state
            .orchestrator
            .handle_turn(EXAMPLE_TICKET_ID, SessionContext::default())
            .await;
        assert!(envelope.show_upgrade_buttons);
        assert!(ctx.has_ticket_info);
    }

    #[tokio::test]
    async fn empty_registry_rejects_through_both_paths() {
        let state = AppState::reference(
            TicketRegistry::new(Vec::new()),
            DelegateSettings::default(),
        );
        let outcome = state.tickets.validate(EXAMPLE_TICKET_ID, None).await.unwrap();
        assert!(!outcome.eligible);

        let (envelope, _) = state
            .orchestrator
            .handle_turn(EXAMPLE_TICKET_ID, SessionContext::default())
            .await;
        assert!(!envelope.show_upgrade_buttons);
    }
}

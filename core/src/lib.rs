pub mod catalog;
pub mod delegate;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod gate;
pub mod intent;
pub mod orchestrator;
pub mod reference;
pub mod session;
pub mod state;
pub mod utterance;

pub use delegate::{
    Collaborators, DelegateCaller, DelegateSettings, PriceQuote, PricingService, ReasoningDelegate,
    Recommendation, RecommendationService, TicketValidator, ValidationOutcome,
};
pub use error::{ApiError, TurnIssue, UpstreamError};
pub use gate::ValidationGate;
pub use intent::Intent;
pub use orchestrator::{Orchestrator, ReplySource, TurnOutcome};
pub use session::{
    ResponseEnvelope, Sender, SessionContext, TicketProfile, Turn, UiAction, UpgradeOption,
};
pub use state::ConversationState;

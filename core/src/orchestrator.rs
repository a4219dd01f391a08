//! Per-turn sequencing: extract, classify, gate, delegate, fall back, emit.
//!
//! The orchestrator holds no session state. Each turn takes the caller's
//! context by value and returns a complete replacement, so a cancelled turn
//! commits nothing.

use crate::delegate::{Collaborators, DelegateCaller, DelegateResult, DelegateSettings, PriceQuote};
use crate::error::TurnIssue;
use crate::extract::{self, Extraction};
use crate::fallback;
use crate::gate::{GateStatus, ValidationGate};
use crate::intent::{self, Intent};
use crate::reference::TicketRegistry;
use crate::session::{ResponseEnvelope, Sender, SessionContext, Turn, UiAction, UpgradeOption};
use crate::state::{ConversationState, SessionEvent};
use crate::utterance::Utterance;

/// Marker the reasoning delegate may emit to ask for the option buttons.
pub const SHOW_OPTIONS_MARKER: &str = "SHOW_UPGRADE_OPTIONS";

const PROMPT_HISTORY_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Delegate,
    Template,
}

impl ReplySource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delegate => "delegate",
            Self::Template => "template",
        }
    }
}

/// Everything one turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub envelope: ResponseEnvelope,
    pub context: SessionContext,
    pub intent: Intent,
    pub state: ConversationState,
    pub reply_source: ReplySource,
    pub issues: Vec<TurnIssue>,
}

#[derive(Clone)]
pub struct Orchestrator {
    gate: ValidationGate,
    delegates: DelegateCaller,
}

fn advance(state: ConversationState, event: SessionEvent) -> ConversationState {
    match state.transition(event) {
        Ok(next) => next,
        Err(err) => {
            tracing::debug!(%err, "transition ignored");
            state
        }
    }
}

fn note<T>(issues: &mut Vec<TurnIssue>, result: DelegateResult<T>) -> Option<T> {
    match result {
        DelegateResult::Usable(value) => Some(value),
        DelegateResult::Unusable { operation, reason } => {
            issues.push(TurnIssue::UpstreamUnavailable {
                operation: operation.as_str(),
                reason: reason.to_string(),
            });
            None
        }
    }
}

/// Features of the disclosed options that the customer mentioned.
fn preferences(message: &str, options: &[UpgradeOption]) -> Vec<String> {
    let utterance = Utterance::new(message);
    let mut found: Vec<String> = Vec::new();
    for feature in options.iter().flat_map(|o| o.features.iter()) {
        if utterance.contains(feature) && !found.contains(feature) {
            found.push(feature.clone());
        }
    }
    found
}

/// Prompt for the reasoning delegate.
pub fn build_prompt(
    message: &str,
    ctx: &SessionContext,
    intent: Intent,
    state: ConversationState,
    plan: &ResponseEnvelope,
) -> String {
    let mut prompt = String::from(
        "You are a friendly assistant helping a customer upgrade an event ticket.\n\n",
    );
    prompt.push_str(&format!("Customer message: {message}\n"));

    let recent = ctx.recent_turns(PROMPT_HISTORY_TURNS);
    if !recent.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in recent {
            let speaker = match turn.sender {
                Sender::Customer => "customer",
                Sender::Assistant => "assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.content));
        }
    }

    prompt.push_str(&format!(
        "\nTicket ID: {}\nTicket validated: {}\nDetected intent: {}\nConversation state: {}\n",
        ctx.ticket_id.as_deref().unwrap_or("not provided"),
        if ctx.is_validated() { "yes" } else { "no" },
        intent.as_str(),
        state.as_str(),
    ));

    prompt.push_str("\nConstraints:\n");
    if ctx.is_validated() && state.allows_disclosure() {
        prompt.push_str(&format!(
            "- To display the upgrade option buttons, include the marker {SHOW_OPTIONS_MARKER}.\n"
        ));
    } else {
        prompt.push_str(
            "- Do not list, price or offer upgrade options. Ask for the ticket ID if it is missing.\n",
        );
    }
    if plan.show_upgrade_buttons {
        prompt.push_str("- The upgrade options are shown below your reply; refer to them briefly.\n");
    }
    prompt.push_str("- Never confirm or process an upgrade.\n- Keep the reply under 120 words.\n");
    prompt
}

fn strip_marker(text: &str) -> (String, bool) {
    if text.contains(SHOW_OPTIONS_MARKER) {
        (text.replace(SHOW_OPTIONS_MARKER, "").trim().to_string(), true)
    } else {
        (text.to_string(), false)
    }
}

impl Orchestrator {
    pub fn new(gate: ValidationGate, delegates: DelegateCaller) -> Self {
        Self { gate, delegates }
    }

    pub fn from_collaborators(collaborators: &Collaborators, settings: DelegateSettings) -> Self {
        let gate = ValidationGate::new(collaborators.tickets.clone(), settings.timeout);
        let delegates = DelegateCaller::new(
            collaborators.pricing.clone(),
            collaborators.recommendations.clone(),
            collaborators.reasoning.clone(),
            settings,
        );
        Self::new(gate, delegates)
    }

    /// Orchestrator backed entirely by the in-process reference services.
    pub fn reference(registry: TicketRegistry, settings: DelegateSettings) -> Self {
        Self::from_collaborators(&Collaborators::reference(registry), settings)
    }

    pub async fn handle_turn(
        &self,
        message: &str,
        context: SessionContext,
    ) -> (ResponseEnvelope, SessionContext) {
        self.handle_turn_with_action(message, context, None).await
    }

    pub async fn handle_turn_with_action(
        &self,
        message: &str,
        context: SessionContext,
        action: Option<&UiAction>,
    ) -> (ResponseEnvelope, SessionContext) {
        let outcome = self.run_turn(message, context, action).await;
        (outcome.envelope, outcome.context)
    }

    pub async fn run_turn(
        &self,
        message: &str,
        context: SessionContext,
        action: Option<&UiAction>,
    ) -> TurnOutcome {
        let message = message.trim();
        let mut ctx = context;
        let mut issues = Vec::new();

        if ctx.state == Some(ConversationState::Rejected) {
            ctx.clear_ticket_facts();
        }
        let started_from = ConversationState::reconcile(&ctx);
        let mut state = advance(started_from, SessionEvent::TurnStarted);

        let prior_ticket = ctx.ticket_id.clone();
        let prior_selection = ctx.selected_upgrade.clone();
        let (enriched, mut extraction) = extract::enrich(message, ctx, action);
        ctx = enriched;
        let candidate = extraction.ticket.as_ref().map(|m| m.ticket_id.clone());

        let new_candidate = candidate.is_some() && candidate != prior_ticket;
        if state == ConversationState::Confirmed {
            // A confirmed upgrade is final for its ticket.
            ctx.ticket_id = prior_ticket.clone();
            ctx.selected_upgrade = prior_selection;
        } else if new_candidate {
            ctx.clear_ticket_facts();
            extraction.selection = None;
            extraction.selection_source = None;
        }

        let intent = intent::classify_with(message, &ctx, &extraction, state);

        let needs_validation = match &candidate {
            None => false,
            Some(_) if state == ConversationState::Confirmed => false,
            Some(_) if new_candidate => true,
            Some(_) => !(ctx.is_validated() || state == ConversationState::Rejected),
        };

        let (envelope, reply_source) = if needs_validation {
            state = advance(state, SessionEvent::TicketCandidate);
            let (decision, validated_ctx) = self
                .gate
                .check_and_record(candidate.as_deref(), ctx)
                .await;
            ctx = validated_ctx;
            let event = match decision.status {
                GateStatus::Validated => SessionEvent::ValidationPassed,
                GateStatus::Rejected => SessionEvent::ValidationRejected,
                GateStatus::Unreachable | GateStatus::MissingTicket => {
                    SessionEvent::ValidationUnavailable
                }
            };
            state = advance(state, event);
            match decision.status {
                GateStatus::Rejected => issues.push(TurnIssue::ValidationRejected {
                    ticket_id: decision.ticket_id.clone().unwrap_or_default(),
                    reason: decision.outcome.reason.clone(),
                }),
                GateStatus::Unreachable => issues.push(TurnIssue::UpstreamUnavailable {
                    operation: "validation",
                    reason: decision.outcome.reason.clone(),
                }),
                GateStatus::Validated | GateStatus::MissingTicket => {}
            }
            (
                fallback::validation_reply(&decision, &ctx),
                ReplySource::Template,
            )
        } else {
            self.respond(message, &mut ctx, &mut state, intent, &extraction, &mut issues)
                .await
        };

        let envelope = Self::commit(message, envelope, &mut ctx, &mut state);

        tracing::info!(
            intent = intent.as_str(),
            from = started_from.as_str(),
            to = state.as_str(),
            reply_source = reply_source.as_str(),
            show_upgrade_buttons = envelope.show_upgrade_buttons,
            issues = issues.len(),
            "turn handled"
        );
        for issue in &issues {
            tracing::debug!(kind = issue.kind(), ?issue, "turn issue");
        }

        TurnOutcome {
            envelope,
            context: ctx,
            intent,
            state,
            reply_source,
            issues,
        }
    }

    /// Reply for a turn that did not validate a ticket.
    async fn respond(
        &self,
        message: &str,
        ctx: &mut SessionContext,
        state: &mut ConversationState,
        intent: Intent,
        extraction: &Extraction,
        issues: &mut Vec<TurnIssue>,
    ) -> (ResponseEnvelope, ReplySource) {
        if extraction.malformed_selection {
            issues.push(TurnIssue::MalformedSelection);
            ctx.selected_upgrade = None;
            return (fallback::malformed_selection(ctx), ReplySource::Template);
        }
        if extraction.malformed_ticket_reference && !ctx.is_validated() {
            issues.push(TurnIssue::MalformedTicketReference);
            return (fallback::malformed_ticket_reference(), ReplySource::Template);
        }

        match intent {
            Intent::UpgradeSelection => {
                let selection = extraction.selection.clone();
                match selection {
                    Some(option) if ctx.is_validated() => {
                        let next = state.transition(SessionEvent::OptionSelected);
                        match next {
                            Ok(next) => {
                                *state = next;
                                ctx.selected_upgrade = Some(option.clone());
                                let quote = self.quote_for(ctx, &option, issues).await;
                                (
                                    fallback::selection_reply(&option, quote.as_ref()),
                                    ReplySource::Template,
                                )
                            }
                            Err(err) => {
                                tracing::debug!(%err, "selection outside options state");
                                ctx.selected_upgrade = None;
                                (fallback::malformed_selection(ctx), ReplySource::Template)
                            }
                        }
                    }
                    _ => {
                        ctx.selected_upgrade = None;
                        (fallback::malformed_selection(ctx), ReplySource::Template)
                    }
                }
            }
            Intent::Affirmation if *state == ConversationState::UpgradeSelected => {
                let confirmed = ctx
                    .selected_upgrade
                    .as_ref()
                    .and_then(|selected| ctx.disclosed_option(&selected.id))
                    .cloned();
                match confirmed {
                    Some(option) if ctx.is_validated() => {
                        *state = advance(*state, SessionEvent::SelectionConfirmed);
                        ctx.selected_upgrade = Some(option.clone());
                        (fallback::confirmation_reply(&option), ReplySource::Template)
                    }
                    _ => {
                        ctx.selected_upgrade = None;
                        (fallback::malformed_selection(ctx), ReplySource::Template)
                    }
                }
            }
            Intent::Decline if *state == ConversationState::UpgradeSelected => {
                *state = advance(*state, SessionEvent::SelectionWithdrawn);
                ctx.selected_upgrade = None;
                (fallback::selection_withdrawn(), ReplySource::Template)
            }
            Intent::PricingInquiry
                if ctx.is_validated() && *state != ConversationState::Confirmed =>
            {
                (self.pricing(message, ctx, issues).await, ReplySource::Template)
            }
            _ if *state == ConversationState::Confirmed || intent.is_transactional() => {
                ctx.state = Some(*state);
                (fallback::generate(intent, ctx), ReplySource::Template)
            }
            _ => self.converse(message, ctx, *state, intent, issues).await,
        }
    }

    async fn quote_for(
        &self,
        ctx: &SessionContext,
        option: &UpgradeOption,
        issues: &mut Vec<TurnIssue>,
    ) -> Option<PriceQuote> {
        let profile = ctx.ticket.as_ref()?;
        let original = profile.original_price?;
        let result = self
            .delegates
            .price(&profile.current_tier, &option.id, original)
            .await;
        note(issues, result)
    }

    /// Pricing for a validated ticket: quote and recommendation run concurrently.
    async fn pricing(
        &self,
        message: &str,
        ctx: &SessionContext,
        issues: &mut Vec<TurnIssue>,
    ) -> ResponseEnvelope {
        let options = fallback::disclosable_options(ctx).unwrap_or_default();
        let target = ctx
            .selected_upgrade
            .clone()
            .or_else(|| options.first().cloned());
        let prefs = preferences(message, &options);
        let profile = ctx.ticket.clone();

        let quote_call = async {
            let (Some(option), Some(profile)) = (&target, &profile) else {
                return None;
            };
            // No quote without a known original price.
            let original = profile.original_price?;
            Some(
                self.delegates
                    .price(&profile.current_tier, &option.id, original)
                    .await,
            )
        };
        let recommend_call = async {
            match &profile {
                Some(profile) => Some(self.delegates.recommend(profile, &prefs).await),
                None => None,
            }
        };
        let (quote, recommendation) = tokio::join!(quote_call, recommend_call);

        let quote = quote.and_then(|result| note(issues, result));
        let best = recommendation
            .and_then(|result| note(issues, result))
            .and_then(|rec| rec.best_value);
        let quoted = target.as_ref().zip(quote.as_ref());
        fallback::pricing_reply(ctx, quoted, best.as_ref())
    }

    /// Conversational turn: the delegate writes the text, the template plan
    /// decides disclosure.
    async fn converse(
        &self,
        message: &str,
        ctx: &mut SessionContext,
        state: ConversationState,
        intent: Intent,
        issues: &mut Vec<TurnIssue>,
    ) -> (ResponseEnvelope, ReplySource) {
        ctx.state = Some(state);
        let mut plan = fallback::generate(intent, ctx);
        let prompt = build_prompt(message, ctx, intent, state, &plan);

        let wants_recommendation = intent == Intent::UpgradeRequest && ctx.is_validated();
        let prefs = preferences(message, &ctx.upgrade_options);
        let recommend_call = async {
            match (&ctx.ticket, wants_recommendation) {
                (Some(profile), true) => Some(self.delegates.recommend(profile, &prefs).await),
                _ => None,
            }
        };
        let (reply, recommendation) = tokio::join!(self.delegates.reply(&prompt), recommend_call);

        if let Some(best) = recommendation
            .and_then(|result| note(issues, result))
            .and_then(|rec| rec.best_value)
        {
            plan = fallback::options_reply(
                ctx,
                "Here are the upgrades available for your ticket:",
                Some(&best),
            );
        }

        let Some(text) = note(issues, reply) else {
            return (plan, ReplySource::Template);
        };
        let (text, wants_options) = strip_marker(&text);
        let mut envelope = ResponseEnvelope {
            text,
            show_upgrade_buttons: plan.show_upgrade_buttons,
            upgrade_options: plan.upgrade_options,
        };
        if wants_options && !envelope.show_upgrade_buttons && state.allows_disclosure() {
            if let Some(options) = fallback::disclosable_options(ctx) {
                envelope.show_upgrade_buttons = !options.is_empty();
                envelope.upgrade_options = options;
            }
        }
        (envelope, ReplySource::Delegate)
    }

    /// Final gate check, then fold the turn into the context.
    fn commit(
        message: &str,
        mut envelope: ResponseEnvelope,
        ctx: &mut SessionContext,
        state: &mut ConversationState,
    ) -> ResponseEnvelope {
        let may_disclose = ctx.is_validated() && state.allows_disclosure();
        if envelope.show_upgrade_buttons && (!may_disclose || envelope.upgrade_options.is_empty())
        {
            tracing::warn!(
                state = state.as_str(),
                "withholding upgrade options from an unvalidated session"
            );
            envelope.withhold_options();
        }
        if !envelope.show_upgrade_buttons {
            envelope.upgrade_options.clear();
        }
        if envelope.show_upgrade_buttons {
            ctx.upgrade_options = envelope.upgrade_options.clone();
            ctx.selected_upgrade = None;
            *state = advance(*state, SessionEvent::OptionsDisclosed);
        }

        ctx.turns.push(Turn::customer(message));
        ctx.turns.push(Turn::assistant(envelope.text.clone()));
        ctx.state = Some(*state);
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::catalog::standard_catalog;
    use crate::delegate::{ReasoningDelegate, TicketValidator, ValidationOutcome};
    use crate::error::UpstreamError;
    use crate::reference::{MatrixPricing, ValueRecommender};
    use crate::session::TicketProfile;

    const VALID: &str = "550e8400-e29b-41d4-a716-446655440002";
    const INVALID: &str = "99999999-8888-7777-6666-555555555555";
    const FLAKY: &str = "12345678-1234-1234-1234-123456789abc";

    #[derive(Default)]
    struct ScriptedValidator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TicketValidator for ScriptedValidator {
        async fn validate(
            &self,
            ticket_id: &str,
            _upgrade_tier: Option<&str>,
        ) -> Result<ValidationOutcome, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match ticket_id {
                VALID => Ok(ValidationOutcome {
                    eligible: true,
                    current_tier: "general".to_string(),
                    reason: String::new(),
                    available_upgrades: standard_catalog(),
                    original_price: Some(Decimal::new(40, 0)),
                }),
                FLAKY => Err(UpstreamError::Transport("connection reset".to_string())),
                _ => Ok(ValidationOutcome::rejected("ticket not found")),
            }
        }
    }

    struct ScriptedReasoning {
        replies: HashMap<&'static str, &'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedReasoning {
        fn new(replies: &[(&'static str, &'static str)]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReasoningDelegate for ScriptedReasoning {
        async fn reply(&self, prompt: &str) -> Result<String, UpstreamError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .iter()
                .find(|(key, _)| prompt.contains(&format!("Customer message: {key}\n")))
                .map(|(_, reply)| reply.to_string())
                .ok_or(UpstreamError::Status(503))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        validator: Arc<ScriptedValidator>,
        reasoning: Arc<ScriptedReasoning>,
    }

    fn harness(replies: &[(&'static str, &'static str)]) -> Harness {
        let validator = Arc::new(ScriptedValidator::default());
        let reasoning = Arc::new(ScriptedReasoning::new(replies));
        let settings = DelegateSettings {
            timeout: Duration::from_millis(200),
            min_reply_chars: 40,
        };
        let orchestrator = Orchestrator::new(
            ValidationGate::new(validator.clone(), settings.timeout),
            DelegateCaller::new(
                Arc::new(MatrixPricing),
                Arc::new(ValueRecommender),
                reasoning.clone(),
                settings,
            ),
        );
        Harness {
            orchestrator,
            validator,
            reasoning,
        }
    }

    fn offline() -> Orchestrator {
        harness(&[]).orchestrator
    }

    fn disclosed_context() -> SessionContext {
        SessionContext {
            ticket_id: Some(VALID.to_string()),
            has_ticket_info: true,
            upgrade_options: standard_catalog(),
            ..SessionContext::default()
        }
    }

    #[tokio::test]
    async fn upgrade_request_without_ticket_asks_for_one() {
        let (envelope, ctx) = offline()
            .handle_turn("I want to upgrade", SessionContext::default())
            .await;
        assert!(envelope.text.contains("ticket ID"));
        assert!(!envelope.show_upgrade_buttons);
        assert_eq!(ctx.state, Some(ConversationState::AwaitingTicket));
        assert_eq!(ctx.turns.len(), 2);
    }

    #[tokio::test]
    async fn valid_ticket_discloses_three_options() {
        let (envelope, ctx) = offline()
            .handle_turn(VALID, SessionContext::default())
            .await;
        assert!(ctx.has_ticket_info);
        assert!(envelope.show_upgrade_buttons);
        assert_eq!(envelope.upgrade_options.len(), 3);
        assert_eq!(ctx.upgrade_options, envelope.upgrade_options);
        assert_eq!(ctx.state, Some(ConversationState::OptionsPresented));
    }

    #[tokio::test]
    async fn invalid_ticket_is_rejected_with_reason() {
        let outcome = offline()
            .run_turn(INVALID, SessionContext::default(), None)
            .await;
        assert!(!outcome.envelope.show_upgrade_buttons);
        assert!(outcome.envelope.text.contains("not eligible"));
        assert!(outcome.envelope.text.contains("ticket not found"));
        assert_eq!(outcome.state, ConversationState::Rejected);
        assert!(matches!(
            outcome.issues.as_slice(),
            [TurnIssue::ValidationRejected { .. }]
        ));
    }

    #[tokio::test]
    async fn naming_a_disclosed_option_selects_it_with_price() {
        let (envelope, ctx) = offline()
            .handle_turn("I'd like the VIP Package", disclosed_context())
            .await;
        assert!(envelope.text.contains("VIP Package"));
        assert!(envelope.text.contains("300"));
        assert!(!envelope.show_upgrade_buttons);
        assert_eq!(ctx.selected_upgrade.as_ref().unwrap().id, "vip");
        assert_eq!(ctx.state, Some(ConversationState::UpgradeSelected));
    }

    #[tokio::test]
    async fn selection_before_validation_asks_for_ticket() {
        let (envelope, ctx) = offline()
            .handle_turn("I'd like the VIP Package", SessionContext::default())
            .await;
        assert!(envelope.text.contains("ticket ID"));
        assert!(!envelope.text.contains("confirmed"));
        assert!(ctx.selected_upgrade.is_none());
    }

    #[tokio::test]
    async fn full_journey_reaches_confirmed() {
        let orchestrator = offline();
        let (_, ctx) = orchestrator
            .handle_turn("hi, I'd like to upgrade", SessionContext::default())
            .await;
        let (_, ctx) = orchestrator
            .handle_turn(&format!("my ticket is {VALID}"), ctx)
            .await;
        let outcome = orchestrator.run_turn("premium please", ctx, None).await;
        assert_eq!(outcome.intent, Intent::UpgradeSelection);
        // general ticket at 40 + premium 150
        assert!(outcome.envelope.text.contains("$190"));

        let outcome = orchestrator.run_turn("yes", outcome.context, None).await;
        assert_eq!(outcome.state, ConversationState::Confirmed);
        assert!(outcome.envelope.text.contains("Premium Experience is confirmed for $150"));

        let outcome = orchestrator
            .run_turn("actually show me upgrades", outcome.context, None)
            .await;
        assert_eq!(outcome.state, ConversationState::Confirmed);
        assert!(!outcome.envelope.show_upgrade_buttons);
    }

    #[tokio::test]
    async fn confirming_by_naming_the_selected_option() {
        let orchestrator = offline();
        let outcome = orchestrator.run_turn("vip", disclosed_context(), None).await;
        assert_eq!(outcome.state, ConversationState::UpgradeSelected);

        let outcome = orchestrator
            .run_turn("Yes, confirm the VIP Package", outcome.context, None)
            .await;
        assert_eq!(outcome.intent, Intent::Affirmation);
        assert_eq!(outcome.state, ConversationState::Confirmed);
        assert!(outcome.envelope.text.contains("VIP Package is confirmed"));
    }

    #[tokio::test]
    async fn negated_option_is_not_selected() {
        let outcome = offline()
            .run_turn("I don't want the VIP Package", disclosed_context(), None)
            .await;
        assert_ne!(outcome.intent, Intent::UpgradeSelection);
        assert!(outcome.context.selected_upgrade.is_none());
        assert_eq!(outcome.state, ConversationState::OptionsPresented);
    }

    #[tokio::test]
    async fn premium_round_trips_by_name_and_id() {
        for message in ["Premium Experience", "premium"] {
            let (envelope, _) = offline().handle_turn(message, disclosed_context()).await;
            assert!(envelope.text.contains("Premium Experience"), "{message}");
            assert!(envelope.text.contains("150"), "{message}");
        }
    }

    #[tokio::test]
    async fn button_click_outside_the_list_never_confirms() {
        let orchestrator = offline();
        let action = UiAction::UpgradeSelected {
            option_id: "platinum".to_string(),
        };
        let outcome = orchestrator
            .run_turn("this one", disclosed_context(), Some(&action))
            .await;
        assert_eq!(outcome.intent, Intent::Unknown);
        assert!(outcome.issues.contains(&TurnIssue::MalformedSelection));
        assert!(outcome.envelope.show_upgrade_buttons);

        let outcome = orchestrator.run_turn("yes", outcome.context, None).await;
        assert_ne!(outcome.state, ConversationState::Confirmed);
    }

    #[tokio::test]
    async fn rejected_ticket_never_shows_options() {
        let orchestrator = offline();
        let (_, mut ctx) = orchestrator
            .handle_turn(INVALID, SessionContext::default())
            .await;
        for message in [
            "show me the upgrades",
            "vip",
            "yes",
            "how much is premium",
            "what features are included",
        ] {
            let (envelope, next) = orchestrator.handle_turn(message, ctx).await;
            assert!(!envelope.show_upgrade_buttons, "{message}");
            assert_eq!(next.state, Some(ConversationState::Rejected), "{message}");
            ctx = next;
        }
    }

    #[tokio::test]
    async fn rejected_ticket_is_not_revalidated() {
        let h = harness(&[]);
        let (_, ctx) = h
            .orchestrator
            .handle_turn(INVALID, SessionContext::default())
            .await;
        let (_, ctx) = h
            .orchestrator
            .handle_turn(&format!("try {INVALID} again"), ctx)
            .await;
        assert_eq!(h.validator.calls.load(Ordering::SeqCst), 1);

        let (envelope, _) = h.orchestrator.handle_turn(VALID, ctx).await;
        assert!(envelope.show_upgrade_buttons);
        assert_eq!(h.validator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_validator_fails_closed() {
        let outcome = offline()
            .run_turn(&format!("upgrade {FLAKY}"), SessionContext::default(), None)
            .await;
        assert!(!outcome.envelope.show_upgrade_buttons);
        assert!(!outcome.context.has_ticket_info);
        assert_eq!(outcome.state, ConversationState::AwaitingTicket);
        assert!(
            outcome
                .issues
                .iter()
                .any(|i| matches!(i, TurnIssue::UpstreamUnavailable { .. }))
        );
    }

    #[tokio::test]
    async fn tampered_context_cannot_unlock_options() {
        let tampered = SessionContext {
            ticket_id: Some(INVALID.to_string()),
            has_ticket_info: false,
            upgrade_options: standard_catalog(),
            state: Some(ConversationState::Confirmed),
            ..SessionContext::default()
        };
        let (envelope, ctx) = offline().handle_turn("show me upgrades", tampered).await;
        assert!(!envelope.show_upgrade_buttons);
        assert_ne!(ctx.state, Some(ConversationState::Confirmed));
    }

    #[tokio::test]
    async fn gating_holds_across_scripted_sessions() {
        let orchestrator = harness(&[(
            "tell me something",
            "Here is a long and friendly reply SHOW_UPGRADE_OPTIONS with the buttons please.",
        )])
        .orchestrator;
        let scripts: [&[&str]; 4] = [
            &["hello", "tell me something", VALID, "tell me something", "vip", "no", "yes"],
            &[INVALID, "tell me something", "premium", "yes"],
            &[FLAKY, "upgrade", "tell me something", "features?"],
            &["550e8400-e29b", "tell me something", "how much", VALID, "how much"],
        ];
        for script in scripts {
            let mut ctx = SessionContext::default();
            for message in script {
                let (envelope, next) = orchestrator.handle_turn(message, ctx).await;
                if envelope.show_upgrade_buttons {
                    assert!(next.has_ticket_info, "{message}");
                    assert!(!envelope.upgrade_options.is_empty(), "{message}");
                }
                ctx = next;
            }
        }
    }

    #[tokio::test]
    async fn replaying_a_turn_is_idempotent() {
        let orchestrator = offline();
        for (message, ctx) in [
            ("I want to upgrade", SessionContext::default()),
            ("what's included?", disclosed_context()),
            ("I'd like the VIP Package", disclosed_context()),
        ] {
            let (first, _) = orchestrator.handle_turn(message, ctx.clone()).await;
            let (second, _) = orchestrator.handle_turn(message, ctx).await;
            assert_eq!(first, second, "{message}");
        }
    }

    #[tokio::test]
    async fn delegate_text_is_used_and_marker_honored_only_when_validated() {
        let reply = "Happy to help! Your upgrade choices are shown below. SHOW_UPGRADE_OPTIONS";
        let h = harness(&[("what do you think about it", reply)]);

        let outcome = h
            .orchestrator
            .run_turn("what do you think about it", disclosed_context(), None)
            .await;
        assert_eq!(outcome.reply_source, ReplySource::Delegate);
        assert!(!outcome.envelope.text.contains(SHOW_OPTIONS_MARKER));
        assert!(outcome.envelope.show_upgrade_buttons);

        let outcome = h
            .orchestrator
            .run_turn("what do you think about it", SessionContext::default(), None)
            .await;
        assert_eq!(outcome.reply_source, ReplySource::Delegate);
        assert!(!outcome.envelope.text.contains(SHOW_OPTIONS_MARKER));
        assert!(!outcome.envelope.show_upgrade_buttons);
    }

    #[tokio::test]
    async fn short_delegate_reply_falls_back() {
        let h = harness(&[("hello", "Hi!")]);
        let outcome = h
            .orchestrator
            .run_turn("hello", SessionContext::default(), None)
            .await;
        assert_eq!(outcome.reply_source, ReplySource::Template);
        assert!(outcome.envelope.text.contains("ticket ID"));
        assert!(
            outcome
                .issues
                .iter()
                .any(|i| matches!(i, TurnIssue::UpstreamUnavailable { operation: "reply", .. }))
        );
    }

    #[tokio::test]
    async fn prompt_carries_recent_turns_and_constraints() {
        let h = harness(&[]);
        let mut ctx = SessionContext::default();
        for i in 0..5 {
            ctx.turns.push(Turn::customer(format!("earlier {i}")));
        }
        h.orchestrator.handle_turn("hello", ctx).await;
        let prompts = h.reasoning.prompts.lock().unwrap();
        let prompt = prompts.last().unwrap();
        assert!(prompt.contains("Customer message: hello"));
        assert!(prompt.contains("earlier 4"));
        assert!(prompt.contains("earlier 2"));
        assert!(!prompt.contains("earlier 1"));
        assert!(prompt.contains("Ticket validated: no"));
        assert!(prompt.contains("Do not list, price or offer upgrade options"));
    }

    #[tokio::test]
    async fn pricing_inquiry_quotes_and_recommends() {
        let mut ctx = disclosed_context();
        ctx.ticket = Some(TicketProfile {
            ticket_id: VALID.to_string(),
            current_tier: "general".to_string(),
            original_price: Some(Decimal::new(40, 0)),
        });
        let outcome = offline().run_turn("how much does it cost?", ctx, None).await;
        assert_eq!(outcome.intent, Intent::PricingInquiry);
        assert!(outcome.envelope.text.contains("$90"));
        assert!(outcome.envelope.text.contains("Best value: the Standard Upgrade"));
        assert!(outcome.envelope.show_upgrade_buttons);
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn pricing_without_original_price_skips_the_quote() {
        let mut ctx = disclosed_context();
        ctx.ticket = Some(TicketProfile {
            ticket_id: VALID.to_string(),
            current_tier: "general".to_string(),
            original_price: None,
        });
        let outcome = offline().run_turn("how much does it cost?", ctx, None).await;
        assert_eq!(outcome.intent, Intent::PricingInquiry);
        assert!(!outcome.envelope.text.contains("$0"));
        assert!(!outcome.envelope.text.contains("brings your total"));
        assert!(outcome.envelope.text.contains("Best value"));
    }

    #[tokio::test]
    async fn ticket_prompt_is_not_mistaken_for_the_customers_ticket() {
        let h = harness(&[]);
        let (_, ctx) = h
            .orchestrator
            .handle_turn("I want to upgrade", SessionContext::default())
            .await;
        let outcome = h.orchestrator.run_turn("what can you do?", ctx, None).await;
        assert!(!outcome.envelope.show_upgrade_buttons);
        assert!(outcome.context.ticket_id.is_none());
        assert!(!outcome.context.has_ticket_info);
        assert_eq!(h.validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn decline_after_selection_returns_to_options() {
        let mut ctx = disclosed_context();
        ctx.selected_upgrade = Some(ctx.upgrade_options[0].clone());
        ctx.state = Some(ConversationState::UpgradeSelected);
        let outcome = offline().run_turn("no thanks", ctx, None).await;
        assert_eq!(outcome.state, ConversationState::OptionsPresented);
        assert!(outcome.context.selected_upgrade.is_none());
    }

    #[tokio::test]
    async fn ticket_in_history_is_remembered() {
        let orchestrator = offline();
        let ctx = SessionContext {
            turns: vec![
                Turn::customer(format!("ticket {VALID}")),
                Turn::assistant("Thanks!"),
            ],
            ..SessionContext::default()
        };
        let (envelope, ctx) = orchestrator.handle_turn("upgrade options?", ctx).await;
        assert!(ctx.has_ticket_info);
        assert!(envelope.show_upgrade_buttons);
    }

    #[tokio::test]
    async fn truncated_ticket_asks_for_full_id() {
        let outcome = offline()
            .run_turn("my ticket is 550e8400-e29b", SessionContext::default(), None)
            .await;
        assert!(outcome.issues.contains(&TurnIssue::MalformedTicketReference));
        assert!(outcome.envelope.text.contains("full ticket ID"));
        assert!(!outcome.context.has_ticket_info);
    }
}

//! Deterministic reply templates.
//!
//! Every function here is pure. Options are only disclosed for a validated
//! context, so the gating rule holds even when no delegate is reachable.

use crate::catalog::{format_price, standard_catalog};
use crate::delegate::PriceQuote;
use crate::gate::{GateDecision, GateStatus};
use crate::intent::Intent;
use crate::session::{ResponseEnvelope, SessionContext, UpgradeOption};
use crate::state::ConversationState;

/// Shape of a ticket id, shown instead of a real one.
const TICKET_ID_SHAPE: &str = "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx";

/// Options the context may disclose, or `None` when it may not.
pub fn disclosable_options(ctx: &SessionContext) -> Option<Vec<UpgradeOption>> {
    if !ctx.is_validated() {
        return None;
    }
    if ctx.upgrade_options.is_empty() {
        Some(standard_catalog())
    } else {
        Some(ctx.upgrade_options.clone())
    }
}

fn option_lines(options: &[UpgradeOption]) -> String {
    options
        .iter()
        .map(|option| {
            let mut line = format!("• {} ({})", option.name, format_price(option.price));
            if !option.description.is_empty() {
                line.push_str(&format!(": {}", option.description));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn feature_lines(options: &[UpgradeOption]) -> String {
    options
        .iter()
        .map(|option| {
            if option.features.is_empty() {
                format!("• {} ({})", option.name, format_price(option.price))
            } else {
                format!(
                    "• {} ({}): {}",
                    option.name,
                    format_price(option.price),
                    option.features.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask for a ticket id. Never discloses options.
pub fn ask_for_ticket(lead: &str) -> ResponseEnvelope {
    ResponseEnvelope::reply(format!(
        "{lead} To see the upgrades available to you, please share your ticket ID \
         (it looks like {TICKET_ID_SHAPE})."
    ))
}

fn ticket_label(ctx: &SessionContext) -> String {
    ctx.ticket_id.clone().unwrap_or_else(|| "your ticket".to_string())
}

/// Disclose the gated options, highlighting a best value pick when known.
pub fn options_reply(
    ctx: &SessionContext,
    lead: &str,
    best_value: Option<&UpgradeOption>,
) -> ResponseEnvelope {
    let Some(options) = disclosable_options(ctx) else {
        return ask_for_ticket("I'd be happy to help you upgrade your ticket!");
    };
    let mut text = format!("{lead}\n\n{}", option_lines(&options));
    if let Some(best) = best_value.filter(|best| options.iter().any(|o| o.id == best.id)) {
        text.push_str(&format!(
            "\n\nBased on what's included, the {} is the best value for your ticket.",
            best.name
        ));
    }
    text.push_str("\n\nJust pick one below or tell me which upgrade you'd like.");
    ResponseEnvelope::with_options(text, options)
}

/// Reply after the customer picked an option. Never re-discloses the list.
pub fn selection_reply(option: &UpgradeOption, quote: Option<&PriceQuote>) -> ResponseEnvelope {
    let mut text = format!(
        "Excellent choice! You've selected the {} for {}.",
        option.name,
        format_price(option.price)
    );
    if !option.features.is_empty() {
        text.push_str(&format!(" It includes {}.", option.features.join(", ")));
    }
    if let Some(quote) = quote {
        text.push_str(&format!(
            " With your original ticket at {}, your new total would be {}.",
            format_price(quote.original_price),
            format_price(quote.total_price)
        ));
    }
    text.push_str(" Shall I go ahead and confirm this upgrade?");
    ResponseEnvelope::reply(text)
}

pub fn confirmation_reply(option: &UpgradeOption) -> ResponseEnvelope {
    ResponseEnvelope::reply(format!(
        "Your upgrade to the {} is confirmed for {}! You'll receive a confirmation \
         email with your updated ticket details shortly. Enjoy the event!",
        option.name,
        format_price(option.price)
    ))
}

pub fn already_confirmed(ctx: &SessionContext) -> ResponseEnvelope {
    let text = match &ctx.selected_upgrade {
        Some(option) => format!(
            "Your upgrade to the {} is already confirmed. Is there anything else I can help you with?",
            option.name
        ),
        None => "Your upgrade is already confirmed. Is there anything else I can help you with?"
            .to_string(),
    };
    ResponseEnvelope::reply(text)
}

pub fn selection_withdrawn() -> ResponseEnvelope {
    ResponseEnvelope::reply(
        "No problem, I've cleared that selection. Let me know if another upgrade catches your eye.",
    )
}

/// Pricing summary for a validated ticket.
pub fn pricing_reply(
    ctx: &SessionContext,
    quoted: Option<(&UpgradeOption, &PriceQuote)>,
    best_value: Option<&UpgradeOption>,
) -> ResponseEnvelope {
    let Some(options) = disclosable_options(ctx) else {
        return ask_for_ticket("I can give you exact upgrade prices once I've checked your ticket.");
    };
    let mut text = format!(
        "Here's what each upgrade costs for your ticket:\n\n{}",
        option_lines(&options)
    );
    if let Some((option, quote)) = quoted {
        text.push_str(&format!(
            "\n\nFor example, the {} brings your total to {} ({} ticket + {} upgrade).",
            option.name,
            format_price(quote.total_price),
            format_price(quote.original_price),
            format_price(quote.upgrade_price)
        ));
    }
    if let Some(best) = best_value.filter(|best| options.iter().any(|o| o.id == best.id)) {
        text.push_str(&format!("\n\nBest value: the {}.", best.name));
    }
    ResponseEnvelope::with_options(text, options)
}

/// Reply for the turn that ran the validation gate.
pub fn validation_reply(decision: &GateDecision, ctx: &SessionContext) -> ResponseEnvelope {
    let ticket_id = decision.ticket_id.as_deref().unwrap_or("");
    match decision.status {
        GateStatus::Validated => {
            let tier = ctx
                .ticket
                .as_ref()
                .map_or("standard", |t| t.current_tier.as_str());
            options_reply(
                ctx,
                &format!(
                    "Great news! I've verified your ticket {ticket_id} ({tier} tier). \
                     Here are the upgrades available to you:"
                ),
                None,
            )
        }
        GateStatus::Rejected => ResponseEnvelope::reply(format!(
            "I checked your ticket ID '{ticket_id}' with our system, but it is not eligible \
             for upgrades ({}). Please double-check the ID, or share a different ticket.",
            decision.outcome.reason
        )),
        GateStatus::Unreachable => ResponseEnvelope::reply(format!(
            "I wasn't able to verify your ticket {ticket_id} just now. \
             Please try again in a moment."
        )),
        GateStatus::MissingTicket => ask_for_ticket("I couldn't find a ticket ID in your message."),
    }
}

pub fn malformed_ticket_reference() -> ResponseEnvelope {
    ResponseEnvelope::reply(format!(
        "That looks like it might be a ticket ID, but it isn't complete. Please send the full \
         ticket ID; it looks like {TICKET_ID_SHAPE}."
    ))
}

/// The customer picked something that was never offered.
pub fn malformed_selection(ctx: &SessionContext) -> ResponseEnvelope {
    if ctx.is_validated() {
        options_reply(
            ctx,
            "That isn't one of the upgrades available for your ticket. Please choose one of these:",
            None,
        )
    } else {
        ask_for_ticket("I need to check your ticket before I can offer any upgrades.")
    }
}

fn rejected_reminder(ctx: &SessionContext) -> ResponseEnvelope {
    ResponseEnvelope::reply(format!(
        "Unfortunately {} is not eligible for upgrades. If you have another ticket, \
         share its ID and I'll check it.",
        ticket_label(ctx)
    ))
}

/// Canned reply for a conversational turn.
pub fn generate(intent: Intent, ctx: &SessionContext) -> ResponseEnvelope {
    let state = ctx.state.unwrap_or_else(|| ConversationState::infer(ctx));
    let validated = ctx.is_validated();

    if state == ConversationState::Confirmed {
        return match intent {
            Intent::Greeting => ResponseEnvelope::reply(
                "Hello again! Your upgrade is all set. Anything else I can help with?",
            ),
            Intent::Help => ResponseEnvelope::reply(
                "Your upgrade is confirmed. You'll find the details in your confirmation email.",
            ),
            _ => already_confirmed(ctx),
        };
    }

    match intent {
        Intent::Greeting if validated => ResponseEnvelope::reply(format!(
            "Hello! Your ticket {} is verified. Would you like to explore upgrade options?",
            ticket_label(ctx)
        )),
        Intent::Greeting => ask_for_ticket(
            "Hello! I'm your ticket upgrade assistant. I can help you find the perfect upgrade.",
        ),
        Intent::Help => ResponseEnvelope::reply(
            "I can check your ticket, show the upgrades you're eligible for, explain what each \
             one includes and what it costs, and confirm the one you choose. Start by sharing \
             your ticket ID.",
        ),
        Intent::UpgradeRequest | Intent::TicketInquiry | Intent::Affirmation if validated => {
            options_reply(ctx, "Here are the upgrades available for your ticket:", None)
        }
        Intent::FeatureInquiry if validated => {
            let Some(options) = disclosable_options(ctx) else {
                return ask_for_ticket("I'd be happy to walk you through the upgrades.");
            };
            ResponseEnvelope::with_options(
                format!(
                    "Here's what each upgrade includes:\n\n{}",
                    feature_lines(&options)
                ),
                options,
            )
        }
        Intent::FeatureInquiry => ask_for_ticket(
            "Our upgrades range from priority perks to premium seating and backstage access.",
        ),
        Intent::PricingInquiry => pricing_reply(ctx, None, None),
        Intent::UpgradeSelection => match &ctx.selected_upgrade {
            Some(option) if validated && ctx.disclosed_option(&option.id).is_some() => {
                selection_reply(option, None)
            }
            _ => malformed_selection(ctx),
        },
        Intent::Decline => ResponseEnvelope::reply(
            "No problem! If you change your mind, I'm here to help you upgrade anytime.",
        ),
        _ if state == ConversationState::Rejected => rejected_reminder(ctx),
        Intent::UpgradeRequest | Intent::TicketInquiry | Intent::Affirmation => {
            ask_for_ticket("I'd be happy to help you upgrade your ticket!")
        }
        Intent::Unknown if validated => ResponseEnvelope::reply(
            "I'm not sure I understood. Would you like to see your upgrade options, or hear \
             what each one includes?",
        ),
        Intent::Unknown => ask_for_ticket("I'm here to help you upgrade your ticket."),
    }
}

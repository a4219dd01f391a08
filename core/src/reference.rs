//! Rule-based, in-process implementations of the consumed services.
//!
//! Used when no remote collaborator is configured, and as the backend for the
//! local chat mode of the cli.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{self, EXAMPLE_TICKET_ID};
use crate::delegate::{
    Collaborators, PriceQuote, PricingService, ReasoningDelegate, Recommendation, RecommendationService,
    TicketValidator, ValidationOutcome,
};
use crate::error::UpstreamError;
use crate::session::{TicketProfile, UpgradeOption};

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to read tickets file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tickets file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Collaborators {
    /// Every collaborator served in-process; replies come from templates.
    pub fn reference(registry: TicketRegistry) -> Self {
        if registry.is_empty() {
            tracing::warn!("ticket registry is empty, every ticket will be rejected");
        }
        Self {
            tickets: Arc::new(registry),
            pricing: Arc::new(MatrixPricing),
            recommendations: Arc::new(ValueRecommender),
            reasoning: Arc::new(OfflineReasoning),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Active,
    Cancelled,
    Used,
}

impl TicketStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Used => "used",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub ticket_id: String,
    pub ticket_type: String,
    pub original_price: Decimal,
    pub event_date: DateTime<Utc>,
    pub status: TicketStatus,
}

/// Upgrade paths and upgrade prices by current ticket type.
pub fn upgrade_paths(ticket_type: &str) -> &'static [(&'static str, i64)] {
    match ticket_type.trim().to_ascii_lowercase().as_str() {
        "general" => &[("standard", 50), ("premium", 150), ("vip", 300)],
        "standard" => &[("premium", 100), ("vip", 250)],
        "premium" => &[("vip", 150)],
        _ => &[],
    }
}

fn upgrade_price(ticket_type: &str, upgrade_tier: &str) -> Option<Decimal> {
    upgrade_paths(ticket_type)
        .iter()
        .find(|(tier, _)| tier.eq_ignore_ascii_case(upgrade_tier.trim()))
        .map(|(_, price)| Decimal::new(*price, 0))
}

/// Disclosable options for a ticket type, in presentation order.
pub fn available_upgrades(ticket_type: &str) -> Vec<UpgradeOption> {
    upgrade_paths(ticket_type)
        .iter()
        .filter_map(|(tier, price)| catalog::tier(tier).map(|t| t.option_at(Decimal::new(*price, 0))))
        .collect()
}

/// In-memory ticket store answering validation requests.
#[derive(Debug, Clone, Default)]
pub struct TicketRegistry {
    tickets: HashMap<String, TicketRecord>,
}

impl TicketRegistry {
    pub fn new(records: impl IntoIterator<Item = TicketRecord>) -> Self {
        let tickets = records
            .into_iter()
            .map(|record| (record.ticket_id.to_ascii_lowercase(), record))
            .collect();
        Self { tickets }
    }

    /// Registry holding the demo ticket (standard, 75.00, event 30 days out).
    pub fn demo() -> Self {
        Self::new([TicketRecord {
            ticket_id: EXAMPLE_TICKET_ID.to_string(),
            ticket_type: "standard".to_string(),
            original_price: Decimal::new(7500, 2),
            event_date: Utc::now() + Duration::days(30),
            status: TicketStatus::Active,
        }])
    }

    /// Load records from a JSON array file.
    pub fn from_path(path: &Path) -> Result<Self, ReferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let records: Vec<TicketRecord> =
            serde_json::from_str(&raw).map_err(|source| ReferenceError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn get(&self, ticket_id: &str) -> Option<&TicketRecord> {
        self.tickets.get(&ticket_id.trim().to_ascii_lowercase())
    }

    /// Eligibility as of `now`.
    pub fn validate_at(
        &self,
        ticket_id: &str,
        upgrade_tier: Option<&str>,
        now: DateTime<Utc>,
    ) -> ValidationOutcome {
        let Some(record) = self.get(ticket_id) else {
            return ValidationOutcome::rejected("ticket not found");
        };
        let mut outcome = ValidationOutcome {
            eligible: false,
            current_tier: record.ticket_type.clone(),
            reason: String::new(),
            available_upgrades: Vec::new(),
            original_price: Some(record.original_price),
        };
        if record.status != TicketStatus::Active {
            outcome.reason = format!("ticket is {}", record.status.as_str());
            return outcome;
        }
        if record.event_date - now <= Duration::days(1) {
            outcome.reason = "event is too soon to upgrade".to_string();
            return outcome;
        }
        let mut upgrades = available_upgrades(&record.ticket_type);
        if upgrades.is_empty() {
            outcome.reason = format!("no upgrades available for {} tickets", record.ticket_type);
            return outcome;
        }
        if let Some(tier) = upgrade_tier {
            upgrades.retain(|option| option.id.eq_ignore_ascii_case(tier.trim()));
            if upgrades.is_empty() {
                outcome.reason = format!(
                    "upgrade to {tier} is not available for {} tickets",
                    record.ticket_type
                );
                return outcome;
            }
        }
        outcome.eligible = true;
        outcome.reason = "ticket is eligible for upgrades".to_string();
        outcome.available_upgrades = upgrades;
        outcome
    }
}

#[async_trait]
impl TicketValidator for TicketRegistry {
    async fn validate(
        &self,
        ticket_id: &str,
        upgrade_tier: Option<&str>,
    ) -> Result<ValidationOutcome, UpstreamError> {
        Ok(self.validate_at(ticket_id, upgrade_tier, Utc::now()))
    }
}

/// Prices upgrades from the fixed upgrade matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixPricing;

#[async_trait]
impl PricingService for MatrixPricing {
    async fn price(
        &self,
        ticket_type: &str,
        upgrade_tier: &str,
        original_price: Decimal,
    ) -> Result<PriceQuote, UpstreamError> {
        let upgrade_price = upgrade_price(ticket_type, upgrade_tier).ok_or_else(|| {
            UpstreamError::Unavailable(format!(
                "no upgrade path from {ticket_type} to {upgrade_tier}"
            ))
        })?;
        Ok(PriceQuote {
            original_price,
            upgrade_price,
            total_price: original_price + upgrade_price,
        })
    }
}

/// Recommends the option with the most features per dollar.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueRecommender;

fn value_score(option: &UpgradeOption, preferences: &[String]) -> Decimal {
    if option.price <= Decimal::ZERO {
        return Decimal::MAX;
    }
    let matched = preferences
        .iter()
        .filter(|pref| {
            let pref = pref.to_lowercase();
            option
                .features
                .iter()
                .any(|feature| feature.to_lowercase().contains(&pref))
        })
        .count();
    Decimal::from(option.features.len() + 2 * matched) / option.price
}

#[async_trait]
impl RecommendationService for ValueRecommender {
    async fn recommend(
        &self,
        profile: &TicketProfile,
        preferences: &[String],
    ) -> Result<Recommendation, UpstreamError> {
        let recommendations = available_upgrades(&profile.current_tier);
        let best_value = recommendations
            .iter()
            .max_by(|a, b| value_score(a, preferences).cmp(&value_score(b, preferences)))
            .cloned();
        Ok(Recommendation {
            recommendations,
            best_value,
        })
    }
}

/// Reasoning delegate used when none is configured. Always unavailable, so
/// every conversational turn is answered from templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineReasoning;

#[async_trait]
impl ReasoningDelegate for OfflineReasoning {
    async fn reply(&self, _prompt: &str) -> Result<String, UpstreamError> {
        Err(UpstreamError::Unavailable(
            "no reasoning delegate configured".to_string(),
        ))
    }
}

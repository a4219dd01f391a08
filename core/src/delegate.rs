//! Consumed-service contracts and the bounded caller that invokes them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::UpstreamError;
use crate::session::{TicketProfile, UpgradeOption};

pub const DEFAULT_DELEGATE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_MIN_REPLY_CHARS: usize = 40;

/// Answer from the ticket validation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub eligible: bool,
    #[serde(default)]
    pub current_tier: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub available_upgrades: Vec<UpgradeOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
}

impl ValidationOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            current_tier: String::new(),
            reason: reason.into(),
            available_upgrades: Vec::new(),
            original_price: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub original_price: Decimal,
    pub upgrade_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub recommendations: Vec<UpgradeOption>,
    pub best_value: Option<UpgradeOption>,
}

#[async_trait]
pub trait TicketValidator: Send + Sync {
    async fn validate(
        &self,
        ticket_id: &str,
        upgrade_tier: Option<&str>,
    ) -> Result<ValidationOutcome, UpstreamError>;
}

#[async_trait]
pub trait PricingService: Send + Sync {
    async fn price(
        &self,
        ticket_type: &str,
        upgrade_tier: &str,
        original_price: Decimal,
    ) -> Result<PriceQuote, UpstreamError>;
}

#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn recommend(
        &self,
        profile: &TicketProfile,
        preferences: &[String],
    ) -> Result<Recommendation, UpstreamError>;
}

/// Free-form reply generation (LLM-backed in production).
#[async_trait]
pub trait ReasoningDelegate: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// The services a turn may call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub tickets: Arc<dyn TicketValidator>,
    pub pricing: Arc<dyn PricingService>,
    pub recommendations: Arc<dyn RecommendationService>,
    pub reasoning: Arc<dyn ReasoningDelegate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateOperation {
    Reply,
    Pricing,
    Recommendation,
}

impl DelegateOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Pricing => "pricing",
            Self::Recommendation => "recommendation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnusableReason {
    Timeout,
    Upstream(String),
    /// Reply text at or below the minimum length
    Insufficient,
    /// Structured payload lacks the expected fields
    MissingFields,
}

impl std::fmt::Display for UnusableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Upstream(detail) => write!(f, "upstream error: {detail}"),
            Self::Insufficient => write!(f, "reply too short"),
            Self::MissingFields => write!(f, "missing expected fields"),
        }
    }
}

/// Tagged outcome of one delegate call.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateResult<T> {
    Usable(T),
    Unusable {
        operation: DelegateOperation,
        reason: UnusableReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateSettings {
    pub timeout: Duration,
    pub min_reply_chars: usize,
}

impl Default for DelegateSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DELEGATE_TIMEOUT,
            min_reply_chars: DEFAULT_MIN_REPLY_CHARS,
        }
    }
}

/// Invokes the pricing, recommendation and reasoning collaborators with a
/// timeout and sorts every answer into usable or unusable. One attempt per call.
#[derive(Clone)]
pub struct DelegateCaller {
    pricing: Arc<dyn PricingService>,
    recommendations: Arc<dyn RecommendationService>,
    reasoning: Arc<dyn ReasoningDelegate>,
    settings: DelegateSettings,
}

impl DelegateCaller {
    pub fn new(
        pricing: Arc<dyn PricingService>,
        recommendations: Arc<dyn RecommendationService>,
        reasoning: Arc<dyn ReasoningDelegate>,
        settings: DelegateSettings,
    ) -> Self {
        Self {
            pricing,
            recommendations,
            reasoning,
            settings,
        }
    }

    /// Run one call under the configured timeout.
    pub async fn invoke<T, F>(&self, operation: DelegateOperation, call: F) -> DelegateResult<T>
    where
        F: Future<Output = Result<T, UpstreamError>>,
    {
        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(Ok(value)) => DelegateResult::Usable(value),
            Ok(Err(UpstreamError::Timeout)) | Err(_) => {
                tracing::warn!(operation = operation.as_str(), "delegate call timed out");
                DelegateResult::Unusable {
                    operation,
                    reason: UnusableReason::Timeout,
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(operation = operation.as_str(), error = %err, "delegate call failed");
                DelegateResult::Unusable {
                    operation,
                    reason: UnusableReason::Upstream(err.to_string()),
                }
            }
        }
    }

    pub async fn reply(&self, prompt: &str) -> DelegateResult<String> {
        let operation = DelegateOperation::Reply;
        match self.invoke(operation, self.reasoning.reply(prompt)).await {
            DelegateResult::Usable(text) => {
                let trimmed = text.trim();
                if trimmed.chars().count() > self.settings.min_reply_chars {
                    DelegateResult::Usable(trimmed.to_string())
                } else {
                    tracing::debug!(chars = trimmed.chars().count(), "reply below minimum length");
                    DelegateResult::Unusable {
                        operation,
                        reason: UnusableReason::Insufficient,
                    }
                }
            }
            unusable => unusable,
        }
    }

    pub async fn price(
        &self,
        ticket_type: &str,
        upgrade_tier: &str,
        original_price: Decimal,
    ) -> DelegateResult<PriceQuote> {
        let operation = DelegateOperation::Pricing;
        let call = self.pricing.price(ticket_type, upgrade_tier, original_price);
        match self.invoke(operation, call).await {
            DelegateResult::Usable(quote)
                if quote.upgrade_price.is_sign_negative() || quote.total_price.is_sign_negative() =>
            {
                DelegateResult::Unusable {
                    operation,
                    reason: UnusableReason::MissingFields,
                }
            }
            result => result,
        }
    }

    pub async fn recommend(
        &self,
        profile: &TicketProfile,
        preferences: &[String],
    ) -> DelegateResult<Recommendation> {
        let operation = DelegateOperation::Recommendation;
        let call = self.recommendations.recommend(profile, preferences);
        match self.invoke(operation, call).await {
            DelegateResult::Usable(rec)
                if rec.recommendations.is_empty() || rec.best_value.is_none() =>
            {
                DelegateResult::Unusable {
                    operation,
                    reason: UnusableReason::MissingFields,
                }
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PREMIUM, VIP};

    struct FixedReply(Result<String, UpstreamError>);

    #[async_trait]
    impl ReasoningDelegate for FixedReply {
        async fn reply(&self, _prompt: &str) -> Result<String, UpstreamError> {
            self.0.clone()
        }
    }

    struct SlowReply;

    #[async_trait]
    impl ReasoningDelegate for SlowReply {
        async fn reply(&self, _prompt: &str) -> Result<String, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("far too late to be useful to anybody at all, really".to_string())
        }
    }

    struct FixedPrice(Decimal);

    #[async_trait]
    impl PricingService for FixedPrice {
        async fn price(
            &self,
            _ticket_type: &str,
            _upgrade_tier: &str,
            original_price: Decimal,
        ) -> Result<PriceQuote, UpstreamError> {
            Ok(PriceQuote {
                original_price,
                upgrade_price: self.0,
                total_price: original_price + self.0,
            })
        }
    }

    struct FixedRecommendation(Recommendation);

    #[async_trait]
    impl RecommendationService for FixedRecommendation {
        async fn recommend(
            &self,
            _profile: &TicketProfile,
            _preferences: &[String],
        ) -> Result<Recommendation, UpstreamError> {
            Ok(self.0.clone())
        }
    }

    fn build_caller(
        reasoning: Arc<dyn ReasoningDelegate>,
        upgrade_price: Decimal,
        recommendation: Recommendation,
    ) -> DelegateCaller {
        DelegateCaller::new(
            Arc::new(FixedPrice(upgrade_price)),
            Arc::new(FixedRecommendation(recommendation)),
            reasoning,
            DelegateSettings {
                timeout: Duration::from_millis(50),
                min_reply_chars: 40,
            },
        )
    }

    fn empty_recommendation() -> Recommendation {
        Recommendation {
            recommendations: Vec::new(),
            best_value: None,
        }
    }

    fn profile() -> TicketProfile {
        TicketProfile {
            ticket_id: "550e8400-e29b-41d4-a716-446655440002".to_string(),
            current_tier: "standard".to_string(),
            original_price: Some(Decimal::new(75, 0)),
        }
    }

    #[tokio::test]
    async fn long_reply_is_usable_and_trimmed() {
        let text = "  Happy to help! Share your ticket id and I can check upgrades.  ";
        let caller = build_caller(
            Arc::new(FixedReply(Ok(text.to_string()))),
            Decimal::ZERO,
            empty_recommendation(),
        );
        let result = caller.reply("prompt").await;
        assert_eq!(result, DelegateResult::Usable(text.trim().to_string()));
    }

    #[tokio::test]
    async fn short_reply_is_insufficient() {
        let caller = build_caller(
            Arc::new(FixedReply(Ok("OK".to_string()))),
            Decimal::ZERO,
            empty_recommendation(),
        );
        assert_eq!(
            caller.reply("prompt").await,
            DelegateResult::Unusable {
                operation: DelegateOperation::Reply,
                reason: UnusableReason::Insufficient,
            }
        );
    }

    #[tokio::test]
    async fn transport_error_is_unusable() {
        let caller = build_caller(
            Arc::new(FixedReply(Err(UpstreamError::Status(503)))),
            Decimal::ZERO,
            empty_recommendation(),
        );
        let result = caller.reply("prompt").await;
        assert!(matches!(
            result,
            DelegateResult::Unusable {
                reason: UnusableReason::Upstream(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn slow_delegate_times_out() {
        let caller = build_caller(Arc::new(SlowReply), Decimal::ZERO, empty_recommendation());
        assert_eq!(
            caller.reply("prompt").await,
            DelegateResult::Unusable {
                operation: DelegateOperation::Reply,
                reason: UnusableReason::Timeout,
            }
        );
    }

    #[tokio::test]
    async fn negative_price_is_unusable() {
        let caller = build_caller(
            Arc::new(FixedReply(Ok(String::new()))),
            Decimal::new(-10, 0),
            empty_recommendation(),
        );
        assert!(matches!(
            caller.price("standard", "vip", Decimal::new(75, 0)).await,
            DelegateResult::Unusable { .. }
        ));

        let caller = build_caller(
            Arc::new(FixedReply(Ok(String::new()))),
            Decimal::new(250, 0),
            empty_recommendation(),
        );
        let DelegateResult::Usable(quote) = caller.price("standard", "vip", Decimal::new(75, 0)).await
        else {
            panic!("quote should be usable");
        };
        assert_eq!(quote.total_price, Decimal::new(325, 0));
    }

    #[tokio::test]
    async fn recommendation_needs_a_best_value() {
        let caller = build_caller(
            Arc::new(FixedReply(Ok(String::new()))),
            Decimal::ZERO,
            empty_recommendation(),
        );
        assert!(matches!(
            caller.recommend(&profile(), &[]).await,
            DelegateResult::Unusable { .. }
        ));

        let premium = PREMIUM.list_option();
        let caller = build_caller(
            Arc::new(FixedReply(Ok(String::new()))),
            Decimal::ZERO,
            Recommendation {
                recommendations: vec![premium.clone(), VIP.list_option()],
                best_value: Some(premium.clone()),
            },
        );
        let DelegateResult::Usable(rec) = caller.recommend(&profile(), &[]).await else {
            panic!("recommendation should be usable");
        };
        assert_eq!(rec.best_value, Some(premium));
    }
}

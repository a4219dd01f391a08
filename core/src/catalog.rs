use rust_decimal::Decimal;

use crate::session::UpgradeOption;

/// Static description of an upgrade tier.
#[derive(Debug, Clone, Copy)]
pub struct TierDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub features: &'static [&'static str],
    /// List price used by the standard catalog
    pub list_price: i64,
}

pub const STANDARD: TierDescriptor = TierDescriptor {
    id: "standard",
    name: "Standard Upgrade",
    description: "Enhanced comfort with priority perks",
    features: &["Priority boarding", "Extra legroom", "Complimentary drink"],
    list_price: 50,
};

pub const PREMIUM: TierDescriptor = TierDescriptor {
    id: "premium",
    name: "Premium Experience",
    description: "Premium experience with exclusive amenities",
    features: &[
        "Premium seating",
        "Gourmet meal",
        "Fast track entry",
        "Lounge access",
    ],
    list_price: 150,
};

pub const VIP: TierDescriptor = TierDescriptor {
    id: "vip",
    name: "VIP Package",
    description: "Ultimate VIP experience with exclusive access",
    features: &[
        "VIP seating",
        "Meet & greet",
        "Exclusive merchandise",
        "Photo opportunities",
        "Backstage tour",
    ],
    list_price: 300,
};

/// Tiers in presentation order.
pub const TIERS: [TierDescriptor; 3] = [STANDARD, PREMIUM, VIP];

/// Example identifier shown when asking the customer for their ticket.
pub const EXAMPLE_TICKET_ID: &str = "550e8400-e29b-41d4-a716-446655440002";

pub fn tier(id: &str) -> Option<&'static TierDescriptor> {
    TIERS.iter().find(|tier| tier.id.eq_ignore_ascii_case(id.trim()))
}

impl TierDescriptor {
    /// Build a disclosed option for this tier at the given price.
    pub fn option_at(&self, price: Decimal) -> UpgradeOption {
        UpgradeOption {
            id: self.id.to_string(),
            name: self.name.to_string(),
            price,
            features: self.features.iter().map(|f| f.to_string()).collect(),
            description: self.description.to_string(),
        }
    }

    pub fn list_option(&self) -> UpgradeOption {
        self.option_at(Decimal::new(self.list_price, 0))
    }
}

/// The standard three-tier catalog at list prices (50 / 150 / 300).
pub fn standard_catalog() -> Vec<UpgradeOption> {
    TIERS.iter().map(TierDescriptor::list_option).collect()
}

/// Money as shown to customers: `$150`, `$75.50`.
pub fn format_price(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    if rounded.fract().is_zero() {
        format!("${}", rounded.trunc().normalize())
    } else {
        format!("${:.2}", rounded)
    }
}

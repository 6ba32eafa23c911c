pub mod pricing;

pub use pricing::{calculate_price, round_money, PriceBreakdown, PricingConfig, PricingEngine, RateBracket};

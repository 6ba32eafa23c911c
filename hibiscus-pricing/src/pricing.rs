use serde::{Deserialize, Serialize};

/// One row of the distance rate table. The whole trip is billed at the rate of
/// the first bracket whose inclusive upper bound covers the total distance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RateBracket {
    /// Inclusive upper bound in km; `None` is the open-ended last bracket
    pub up_to_km: Option<f64>,
    pub rate_per_km: f64,
}

impl RateBracket {
    const fn bounded(up_to_km: f64, rate_per_km: f64) -> Self {
        Self { up_to_km: Some(up_to_km), rate_per_km }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Platform minimum fare (NZD)
    pub minimum_fare: f64,

    /// Charged for every passenger after the first
    pub extra_passenger_fee: f64,

    /// VIP airport pickup surcharge
    pub vip_pickup_fee: f64,

    pub oversized_luggage_fee: f64,

    /// Ordered by ascending upper bound
    pub brackets: Vec<RateBracket>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            minimum_fare: 100.0,
            extra_passenger_fee: 5.0,
            vip_pickup_fee: 15.0,
            oversized_luggage_fee: 25.0,
            brackets: vec![
                RateBracket::bounded(15.0, 12.00),
                RateBracket::bounded(15.8, 8.00),
                RateBracket::bounded(16.0, 6.00),
                RateBracket::bounded(25.5, 5.50),
                RateBracket::bounded(35.0, 5.00),
                RateBracket::bounded(50.0, 4.00),
                RateBracket::bounded(60.0, 2.60),
                RateBracket::bounded(75.0, 2.47),
                RateBracket::bounded(100.0, 2.70),
                RateBracket { up_to_km: None, rate_per_km: 3.50 },
            ],
        }
    }
}

/// Itemised fare. All money fields are rounded to cents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub distance: f64,
    pub base_price: f64,
    pub airport_fee: f64,
    pub passenger_fee: f64,
    #[serde(rename = "oversizedLuggageFee")]
    pub luggage_fee: f64,
    pub total_price: f64,
    pub rate_per_km: f64,
}

impl PriceBreakdown {
    /// Sum of the itemised fields; equals `total_price` up to rounding.
    pub fn itemised_total(&self) -> f64 {
        self.base_price + self.airport_fee + self.passenger_fee + self.luggage_fee
    }
}

/// Distance-bracket fare calculator
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Rate applied to the entire distance (not incremental per segment).
    pub fn rate_for(&self, distance_km: f64) -> f64 {
        self.config
            .brackets
            .iter()
            .find(|b| b.up_to_km.map_or(true, |limit| distance_km <= limit))
            .or_else(|| self.config.brackets.last())
            .map(|b| b.rate_per_km)
            .unwrap_or(0.0)
    }

    pub fn calculate(
        &self,
        distance_km: f64,
        passengers: u32,
        vip_pickup: bool,
        oversized_luggage: bool,
    ) -> PriceBreakdown {
        let rate_per_km = self.rate_for(distance_km);
        let mut base_price = distance_km * rate_per_km;

        let passenger_fee = f64::from(passengers.saturating_sub(1)) * self.config.extra_passenger_fee;
        let airport_fee = if vip_pickup { self.config.vip_pickup_fee } else { 0.0 };
        let luggage_fee = if oversized_luggage { self.config.oversized_luggage_fee } else { 0.0 };

        let mut total_price = base_price + passenger_fee + airport_fee + luggage_fee;

        // Minimum fare: base absorbs the difference so the items still add up.
        if total_price < self.config.minimum_fare {
            total_price = self.config.minimum_fare;
            base_price = self.config.minimum_fare - passenger_fee - airport_fee - luggage_fee;
        }

        PriceBreakdown {
            distance: round_money(distance_km),
            base_price: round_money(base_price),
            airport_fee: round_money(airport_fee),
            passenger_fee: round_money(passenger_fee),
            luggage_fee: round_money(luggage_fee),
            total_price: round_money(total_price),
            rate_per_km,
        }
    }
}

/// Price a trip with the standard fee schedule.
pub fn calculate_price(
    distance_km: f64,
    passengers: u32,
    vip_pickup: bool,
    oversized_luggage: bool,
) -> PriceBreakdown {
    PricingEngine::default().calculate(distance_km, passengers, vip_pickup, oversized_luggage)
}

pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_boundary_is_inclusive() {
        assert_eq!(calculate_price(15.0, 1, false, false).rate_per_km, 12.00);
        assert_eq!(calculate_price(15.01, 1, false, false).rate_per_km, 8.00);
        assert_eq!(calculate_price(15.8, 1, false, false).rate_per_km, 8.00);
        assert_eq!(calculate_price(16.0, 1, false, false).rate_per_km, 6.00);
        assert_eq!(calculate_price(100.0, 1, false, false).rate_per_km, 2.70);
        assert_eq!(calculate_price(100.01, 1, false, false).rate_per_km, 3.50);
    }

    #[test]
    fn test_whole_distance_billed_at_single_rate() {
        let price = calculate_price(30.0, 1, false, false);
        assert_eq!(price.rate_per_km, 5.00);
        assert_eq!(price.base_price, 150.00);
        assert_eq!(price.total_price, 150.00);
    }

    #[test]
    fn test_extra_passenger_fee() {
        let price = calculate_price(100.0, 4, false, false);
        assert_eq!(price.passenger_fee, 15.00);
        assert_eq!(price.base_price, 270.00);
        assert_eq!(price.total_price, 285.00);
    }

    #[test]
    fn test_options_add_fixed_fees() {
        let price = calculate_price(40.0, 2, true, true);
        assert_eq!(price.base_price, 160.00);
        assert_eq!(price.airport_fee, 15.00);
        assert_eq!(price.luggage_fee, 25.00);
        assert_eq!(price.total_price, 205.00);
    }

    #[test]
    fn test_minimum_fare_back_solves_base() {
        let price = calculate_price(5.0, 1, false, false);
        assert_eq!(price.total_price, 100.00);
        assert_eq!(price.base_price, 100.00);

        let price = calculate_price(0.0, 1, false, false);
        assert_eq!(price.total_price, 100.00);
    }

    #[test]
    fn test_minimum_fare_with_heavy_fees_shrinks_base() {
        // 1km * 12 = 12, fees = 45 + 15 + 25 = 85, subtotal 97 < 100
        let price = calculate_price(1.0, 10, true, true);
        assert_eq!(price.total_price, 100.00);
        assert_eq!(price.base_price, 15.00);
        // The base can only reach zero if fees alone hit the minimum, at which
        // point the subtotal is no longer below it and no clamp happens.
        assert!(price.base_price >= 0.0);
    }

    #[test]
    fn test_total_never_below_minimum_and_items_sum() {
        let mut distance = 0.25;
        while distance <= 1000.0 {
            for passengers in [1, 3, 11] {
                for (vip, luggage) in [(false, false), (true, false), (true, true)] {
                    let price = calculate_price(distance, passengers, vip, luggage);
                    assert!(price.total_price >= 100.0, "distance {distance}");
                    assert!((price.itemised_total() - price.total_price).abs() <= 0.01);
                }
            }
            distance += 3.7;
        }
    }

    #[test]
    fn test_breakdown_serializes_with_dashboard_keys() {
        let json = serde_json::to_value(calculate_price(20.0, 1, false, true)).unwrap();
        assert_eq!(json["oversizedLuggageFee"], 25.0);
        assert_eq!(json["ratePerKm"], 5.5);
        assert!(json.get("totalPrice").is_some());
    }
}

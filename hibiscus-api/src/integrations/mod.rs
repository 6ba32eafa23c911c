pub mod google_maps;
pub mod stripe;

pub use google_maps::GoogleMapsClient;
pub use stripe::StripeGateway;

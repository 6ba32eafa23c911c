pub mod booking;
pub mod driver;
pub mod tracking;

pub use booking::{
    Booking, BookingStatus, DispatchLeg, FlightInfo, GeoPoint, Leg, LegOffer, LegState,
    NotificationLog, PaymentLog, PaymentStatus, ServiceOptions, TrackingStatus,
};
pub use driver::Driver;
pub use tracking::{SessionStatus, TrackingSession};

pub mod manager;
pub mod models;
pub mod notifications;
pub mod payments;

pub use manager::{hours_until_pickup, BookingManager};
pub use models::{
    BookingUpdate, NewBooking, PaymentLinkOutcome, PaymentStatusView, PriceRequest,
    ReminderReport, ResendOutcome,
};

pub mod calendar;
pub mod cooldown;
pub mod dispatcher;
pub mod providers;
pub mod templates;

pub use cooldown::{check_notification_cooldown, Channel};
pub use dispatcher::{JobOffer, NotificationDispatcher};

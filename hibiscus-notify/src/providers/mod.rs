pub mod google_calendar;
pub mod outbox;
pub mod smtp;
pub mod twilio;

pub use google_calendar::GoogleCalendarClient;
pub use outbox::Outbox;
pub use smtp::SmtpEmailSender;
pub use twilio::TwilioSmsSender;

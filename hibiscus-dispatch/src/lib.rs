pub mod dispatcher;
pub mod models;
pub mod tracking;

pub use dispatcher::DispatchService;
pub use models::{
    AssignRequest, Assignment, DriverView, JobView, LocationOutcome, RespondOutcome, RespondStatus,
    TrackingInfo, TrackingStart,
};
pub use tracking::TrackingService;

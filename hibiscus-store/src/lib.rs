pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod driver_repo;
pub mod memory;
pub mod redis_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use driver_repo::PgDriverRepository;
pub use memory::{InMemoryBookingRepository, InMemoryDriverRepository, InMemorySessionStore};
pub use redis_repo::{RedisClient, RedisSessionStore};

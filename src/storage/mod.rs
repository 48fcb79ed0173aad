pub mod database;
pub mod database_applications;
pub mod database_escrow;
pub mod database_gigs;
pub mod database_messages;
pub mod database_milestones;
pub mod database_payments;
pub mod database_reviews;
pub mod database_subscriptions;
pub mod database_users;
pub mod postgres_applications;
pub mod postgres_escrow;
pub mod postgres_gigs;
pub mod postgres_messages;
pub mod postgres_milestones;
pub mod postgres_payments;
pub mod postgres_reviews;
pub mod postgres_store;
pub mod postgres_subscriptions;
pub mod postgres_users;
pub mod time;
pub mod types;

pub use database::Database;
pub use postgres_store::PgStore;
pub use types::{RequestLog, RequestLogStore};

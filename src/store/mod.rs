//! Durable per-participant records, statistics, and broadcast fan-out.

pub mod model;
pub mod users;

pub use model::{AnswerStats, BroadcastReport, Stats, UserRecord};
pub use users::UserStore;

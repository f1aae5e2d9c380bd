pub mod child_repository;
pub mod schedule_repository;
pub mod user_repository;
pub mod vote_repository;

pub use child_repository::*;
pub use schedule_repository::*;
pub use user_repository::*;
pub use vote_repository::*;

pub mod health;
pub mod merge;
pub mod videos;

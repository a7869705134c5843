//! Database repositories
//
// Catalog of merged videos (insert, lookups, visibility, delete, listings)
pub mod catalog;
// Recordings not yet merged, for the store-event sweep
pub mod recordings;

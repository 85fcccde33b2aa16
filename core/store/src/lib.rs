pub mod articles;
pub mod cascade;
pub mod categories;
pub mod cycle;
pub mod database;
pub mod error;
pub mod transfer;
pub mod tree;

pub use cascade::{compute_cascade_set, CascadeSet};
pub use cycle::CycleGuard;
pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use tree::{build_forest, ForestError};

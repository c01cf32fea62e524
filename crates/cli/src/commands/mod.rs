pub mod analyze;
pub mod cache;
pub mod context;
pub mod warm_up;

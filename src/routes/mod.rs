//! HTTP route handlers, thin wrappers around the pure `router`/`aggregator`/
//! `claims` logic (teacher's `routes/` module layout).

pub mod execute;
pub mod health;

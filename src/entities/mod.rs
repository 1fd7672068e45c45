//! SeaORM entity definitions

pub mod prelude;

pub mod delivery_logs;
pub mod persons;

//! Route handlers organized by resource

pub mod activity;
pub mod ask;
pub mod health;
pub mod query;
pub mod reports;
pub mod tables;
pub mod uploads;

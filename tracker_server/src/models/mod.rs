//! Tracker data models.

pub mod activity;
pub mod certificate;
pub mod stats;
pub mod user;

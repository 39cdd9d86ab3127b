pub mod check;
pub mod fmt;
pub mod image;
pub mod integration;
pub mod lint;
pub mod security;

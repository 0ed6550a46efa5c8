//! Pure helpers: candidate generation and input cleaning.

pub mod domain;
pub mod names;
pub mod patterns;

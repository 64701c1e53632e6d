//! Core types, scoring math and the experiment engine for the blindmap quiz.
//!
//! This crate has no HTTP or database dependencies.
//! Storage is reached through the [`store::QuizStore`] trait; everything
//! else here is pure computation over the rows a store hands back.

pub mod answer;
pub mod assignment;
pub mod confusion;
pub mod environment;
pub mod error;
pub mod experiment;
pub mod place;
pub mod selection;
pub mod skill;
pub mod store;
pub mod translation;

pub use error::{Error, Result};

//! Model service implementations for Toolwright.
//!
//! All services implement the `toolwright_core::ModelService` trait:
//! ordered turns in, reply text out.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatModel;

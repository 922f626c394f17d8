//! Portal services.
//!
//! # Services
//!
//! - `exam_token` - Short access codes students type to join an exam

pub mod exam_token;

pub use exam_token::{ExamToken, ExamTokenError};

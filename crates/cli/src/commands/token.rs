//! Exam token commands.

use examhub_portal::services::{ExamToken, ExamTokenError};

/// `examhub token generate`
#[allow(clippy::print_stdout)]
pub fn generate(count: usize) {
    for _ in 0..count {
        println!("{}", ExamToken::generate());
    }
}

/// `examhub token check`
#[allow(clippy::print_stdout)]
pub fn check(input: &str) -> Result<(), ExamTokenError> {
    let token = ExamToken::parse(input)?;
    println!("{token}");
    Ok(())
}

pub mod health;
pub mod letter;

pub use health::{ApiHealth, HealthStatus};
pub use letter::{ErrorBody, Gender, LetterDelta, LetterRequest, LetterResponse};

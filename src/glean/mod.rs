pub mod client;
pub mod response;

pub use client::{AnswerSource, ClientError, GleanClient};
pub use response::AnswerResponse;

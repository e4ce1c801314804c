use crate::services::QuizQuestion;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct QuizResponse {
    /// The model's reply, verbatim.
    pub quiz: String,
    pub questions: Vec<QuizQuestion>,
}

//! Question Source
//!
//! Quiz generation lives outside the session core. The server only needs a
//! request/response seam; production deployments put an LLM-backed client
//! behind [`QuestionSource`]. [`QuestionBank`] is the built-in offline source.

use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Largest round the server will ask for.
pub const MAX_QUESTIONS_PER_REQUEST: usize = 50;

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Topic the question belongs to.
    pub topic: String,
    /// Question text.
    pub prompt: String,
    /// Answer options.
    pub choices: Vec<String>,
    /// Index into `choices` of the correct answer. Kept server-side.
    #[serde(default, skip_serializing)]
    pub answer_index: usize,
}

/// Question generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionError {
    /// Source knows nothing about this topic.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    /// Count is zero or above the limit.
    #[error("invalid question count {0}")]
    InvalidCount(usize),
    /// Upstream generator failed.
    #[error("question source unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can produce questions for a topic.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Generate `count` questions about `topic`.
    async fn generate_questions(&self, topic: &str, count: usize) -> Result<Vec<Question>, QuestionError>;
}

/// Fixed catalogue of questions, filtered by topic.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Bank over an explicit catalogue.
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

impl Default for QuestionBank {
    fn default() -> Self {
        let q = |topic: &str, prompt: &str, choices: [&str; 4], answer_index: usize| Question {
            topic: topic.to_string(),
            prompt: prompt.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
            answer_index,
        };

        Self::new(vec![
            q("science", "What is the chemical symbol for gold?", ["Ag", "Au", "Gd", "Go"], 1),
            q("science", "Which planet has the shortest year?", ["Venus", "Mars", "Mercury", "Earth"], 2),
            q("science", "How many bones are in the adult human body?", ["186", "206", "226", "246"], 1),
            q("geography", "What is the capital of Canada?", ["Toronto", "Vancouver", "Montreal", "Ottawa"], 3),
            q("geography", "Which river flows through Cairo?", ["Nile", "Tigris", "Congo", "Niger"], 0),
            q("geography", "Which is the largest ocean?", ["Atlantic", "Indian", "Pacific", "Arctic"], 2),
            q("history", "In which year did the Berlin Wall fall?", ["1987", "1989", "1991", "1993"], 1),
            q("history", "Who was the first emperor of Rome?", ["Julius Caesar", "Nero", "Augustus", "Trajan"], 2),
            q("history", "Which civilization built Machu Picchu?", ["Aztec", "Maya", "Olmec", "Inca"], 3),
        ])
    }
}

#[async_trait]
impl QuestionSource for QuestionBank {
    async fn generate_questions(&self, topic: &str, count: usize) -> Result<Vec<Question>, QuestionError> {
        if count == 0 || count > MAX_QUESTIONS_PER_REQUEST {
            return Err(QuestionError::InvalidCount(count));
        }

        let topic = topic.trim();
        let matching: Vec<&Question> = self.questions.iter()
            .filter(|q| q.topic.eq_ignore_ascii_case(topic))
            .collect();

        if matching.is_empty() {
            return Err(QuestionError::UnknownTopic(topic.to_string()));
        }

        // Cycle through the catalogue when more are asked for than exist
        Ok(matching.iter().cycle().take(count).map(|q| (*q).clone()).collect())
    }
}

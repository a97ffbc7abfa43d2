use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::submit::SubmissionReceipt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// The default feedback questionnaire
pub fn default_questions() -> Vec<Question> {
    vec![
        Question::new("q1", "What do you find most valuable about our product or service?"),
        Question::new("q2", "What challenges have you faced when using our product?"),
        Question::new(
            "q3",
            "How would you describe your overall experience with our customer support?",
        ),
        Question::new("q4", "What features would you like to see added or improved?"),
        Question::new("q5", "Would you recommend our product to others? Why or why not?"),
    ]
}

/// Walks a respondent through the questions
#[derive(Debug, Clone)]
pub struct Questionnaire {
    questions: Vec<Question>,
    current: usize,
    answers: HashMap<String, SubmissionReceipt>,
}

impl Questionnaire {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            current: 0,
            answers: HashMap::new(),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Record an accepted answer and move to the next question
    pub fn record_answer(&mut self, receipt: SubmissionReceipt) {
        self.answers.insert(receipt.question_id.clone(), receipt);
        self.advance();
    }

    pub fn answer(&self, question_id: &str) -> Option<&SubmissionReceipt> {
        self.answers.get(question_id)
    }

    pub fn answered(&self) -> usize {
        self.answers.len()
    }

    /// Returns false when already at the last question
    pub fn advance(&mut self) -> bool {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Returns false when already at the first question
    pub fn previous(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    pub fn progress_percent(&self) -> f64 {
        if self.questions.is_empty() {
            return 100.0;
        }
        self.answers.len() as f64 / self.questions.len() as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.questions
            .iter()
            .all(|q| self.answers.contains_key(&q.id))
    }
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self::new(default_questions())
    }
}

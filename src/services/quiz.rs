// src/services/quiz.rs
//! Multiple-choice quiz generation from an uploaded deck.
//!
//! The deck is rasterized into a scratch workspace, every slide image is
//! attached to a single prompt, and the model's plain-text answer is returned
//! verbatim together with whatever questions could be parsed out of it.

use super::ServiceError;
use crate::gemini_client::ImageAttachment;
use crate::jobs::new_run_id;
use crate::pipeline::{rasterizer, Rasterizer, RunWorkspace, TextGenerator};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref QUESTION_LINE: Regex =
        Regex::new(r"(?i)^\s*(?:\*\*)?\s*(?:\d+[.)]\s*)?question(?:\s*\d+)?\s*[:.]\s*(?:\*\*)?\s*(.*)$").unwrap();
    static ref OPTION_LINE: Regex = Regex::new(r"^\s*(?:\*\*)?([a-dA-D])[).]\s*(?:\*\*)?\s*(.+?)\s*$").unwrap();
    static ref ANSWER_LINE: Regex =
        Regex::new(r"(?i)^\s*(?:\*\*)?\s*correct answer\s*:\s*(?:\*\*)?\s*([a-d])\b[).]?\s*(.*)$").unwrap();
}

pub const QUIZ_FORMAT: &str = "Question: ...
a) Option 1
b) Option 2
c) Option 3
d) Option 4
Correct Answer: b) Option 2";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<QuizOption>,
    /// Label of the correct option, lowercase (`"a"`..`"d"`).
    pub correct_option: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quiz {
    pub raw: String,
    pub questions: Vec<QuizQuestion>,
}

pub fn quiz_prompt(slide_count: usize) -> String {
    format!(
        "Generate quiz questions with multiple-choice answers based on the following content: \
         the {} attached slide images, in order. Provide the correct answer for each question \
         in the following format:\n{}",
        slide_count, QUIZ_FORMAT
    )
}

#[derive(Default)]
struct QuestionDraft {
    question: String,
    options: Vec<QuizOption>,
    correct_option: Option<String>,
}

impl QuestionDraft {
    fn finish(self) -> Option<QuizQuestion> {
        let question = self.question.trim().to_string();
        let correct_option = self.correct_option?;
        if question.is_empty() || self.options.len() < 2 {
            return None;
        }
        if !self.options.iter().any(|o| o.label == correct_option) {
            return None;
        }
        Some(QuizQuestion {
            question,
            options: self.options,
            correct_option,
        })
    }
}

/// Pull every well-formed question block out of a model reply. Blocks missing
/// a question, fewer than two options or a resolvable answer are dropped.
pub fn parse_quiz(text: &str) -> Vec<QuizQuestion> {
    let mut questions = Vec::new();
    let mut draft: Option<QuestionDraft> = None;

    for line in text.lines() {
        if let Some(caps) = QUESTION_LINE.captures(line) {
            if let Some(done) = draft.take().and_then(QuestionDraft::finish) {
                questions.push(done);
            }
            draft = Some(QuestionDraft {
                question: caps[1].trim().trim_end_matches("**").trim().to_string(),
                ..Default::default()
            });
            continue;
        }

        let Some(current) = draft.as_mut() else {
            continue;
        };

        if let Some(caps) = ANSWER_LINE.captures(line) {
            current.correct_option = Some(caps[1].to_lowercase());
        } else if let Some(caps) = OPTION_LINE.captures(line) {
            current.options.push(QuizOption {
                label: caps[1].to_lowercase(),
                text: caps[2].trim_end_matches("**").trim().to_string(),
            });
        } else if current.options.is_empty() && !line.trim().is_empty() {
            // Question text wrapped onto the next line.
            if !current.question.is_empty() {
                current.question.push(' ');
            }
            current.question.push_str(line.trim());
        }
    }

    if let Some(done) = draft.and_then(QuestionDraft::finish) {
        questions.push(done);
    }
    questions
}

#[derive(Clone)]
pub struct QuizService {
    text: Arc<dyn TextGenerator>,
    rasterizer: Arc<dyn Rasterizer>,
    work_dir: PathBuf,
}

impl QuizService {
    pub fn new(text: Arc<dyn TextGenerator>, rasterizer: Arc<dyn Rasterizer>, work_dir: PathBuf) -> Self {
        Self {
            text,
            rasterizer,
            work_dir,
        }
    }

    pub async fn generate(&self, file_name: &str, bytes: &[u8]) -> Result<Quiz, ServiceError> {
        if rasterizer::detect_format(std::path::Path::new(file_name)).is_err() {
            return Err(ServiceError::UnsupportedFileType);
        }

        let workspace = RunWorkspace::create(&self.work_dir, &format!("quiz-{}", new_run_id())).await?;
        let result = self.generate_in(&workspace, file_name, bytes).await;
        if let Err(e) = workspace.remove().await {
            tracing::warn!("Failed to remove quiz workspace: {}", e);
        }
        result
    }

    async fn generate_in(&self, workspace: &RunWorkspace, file_name: &str, bytes: &[u8]) -> Result<Quiz, ServiceError> {
        let source = workspace.save_source(file_name, bytes).await?;
        let pages = self
            .rasterizer
            .rasterize(&source.path, &workspace.images_dir())
            .await?;
        let slides = rasterizer::into_slides(pages);

        let mut images = Vec::with_capacity(slides.len());
        for slide in &slides {
            let bytes = tokio::fs::read(&slide.path)
                .await
                .map_err(|e| crate::pipeline::PipelineError::workspace(&slide.path, e))?;
            images.push(ImageAttachment {
                mime_type: slide.mime_type().to_string(),
                bytes,
            });
        }

        let raw = self
            .text
            .generate(&quiz_prompt(slides.len()), &images)
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;
        let questions = parse_quiz(&raw);
        tracing::info!(slides = slides.len(), questions = questions.len(), "Quiz generated");

        Ok(Quiz { raw, questions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use crate::types::BoxError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    const SAMPLE: &str = "Here is your quiz:

Question: Which keyword declares an immutable binding in Rust?
a) var
b) let
c) const fn
d) static mut
Correct Answer: b) let

**Question 2:** What does the borrow checker enforce?
a) Garbage collection
b) Formatting
c) Aliasing XOR mutability
d) Naming conventions
**Correct Answer:** c) Aliasing XOR mutability

Question: A broken block with no answer
a) One
b) Two
";

    #[test]
    fn test_parse_quiz_extracts_well_formed_blocks() {
        let questions = parse_quiz(SAMPLE);
        assert_eq!(questions.len(), 2);

        assert_eq!(questions[0].question, "Which keyword declares an immutable binding in Rust?");
        assert_eq!(questions[0].options.len(), 4);
        assert_eq!(questions[0].options[1].text, "let");
        assert_eq!(questions[0].correct_option, "b");

        assert_eq!(questions[1].question, "What does the borrow checker enforce?");
        assert_eq!(questions[1].correct_option, "c");
    }

    #[test]
    fn test_parse_quiz_drops_answers_outside_options() {
        let text = "Question: Pick one\na) Yes\nb) No\nCorrect Answer: d) Maybe";
        assert!(parse_quiz(text).is_empty());
    }

    #[test]
    fn test_parse_quiz_joins_wrapped_question_text() {
        let text = "Question: What is\nownership?\na) A rule set\nb) A crate\nCorrect Answer: a";
        let questions = parse_quiz(text);
        assert_eq!(questions[0].question, "What is ownership?");
        assert_eq!(questions[0].correct_option, "a");
    }

    #[test]
    fn test_prompt_carries_answer_format() {
        let prompt = quiz_prompt(3);
        assert!(prompt.contains("3 attached slide images"));
        assert!(prompt.ends_with("Correct Answer: b) Option 2"));
    }

    struct TwoPages;

    #[async_trait]
    impl Rasterizer for TwoPages {
        async fn rasterize(&self, _document: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
            let mut paths = Vec::new();
            for index in 0..2 {
                let path = output_dir.join(rasterizer::page_file_name(index));
                tokio::fs::write(&path, b"png").await.unwrap();
                paths.push(path);
            }
            Ok(paths)
        }
    }

    struct CannedQuiz {
        attached: Mutex<usize>,
    }

    #[async_trait]
    impl TextGenerator for CannedQuiz {
        async fn generate(&self, _prompt: &str, images: &[ImageAttachment]) -> Result<String, BoxError> {
            *self.attached.lock().unwrap() = images.len();
            Ok(SAMPLE.to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_attaches_every_slide_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let text = Arc::new(CannedQuiz { attached: Mutex::new(0) });
        let service = QuizService::new(text.clone(), Arc::new(TwoPages), dir.path().to_path_buf());

        let quiz = service.generate("lecture.pdf", b"%PDF").await.unwrap();

        assert_eq!(quiz.raw, SAMPLE);
        assert_eq!(quiz.questions.len(), 2);
        assert_eq!(*text.attached.lock().unwrap(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_generate_rejects_other_file_types() {
        let dir = tempfile::tempdir().unwrap();
        let service = QuizService::new(
            Arc::new(CannedQuiz { attached: Mutex::new(0) }),
            Arc::new(TwoPages),
            dir.path().to_path_buf(),
        );

        let err = service.generate("notes.docx", b"PK").await.unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedFileType));
    }
}

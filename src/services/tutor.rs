// src/services/tutor.rs
//! Stateless tutor chat: one message in, one reply out.

use super::ServiceError;
use crate::pipeline::TextGenerator;
use std::sync::Arc;

pub fn tutor_prompt(message: &str) -> String {
    format!("Respond to the following message as a helpful AI tutor: \"{}\"", message)
}

#[derive(Clone)]
pub struct TutorService {
    text: Arc<dyn TextGenerator>,
}

impl TutorService {
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    pub async fn reply(&self, message: &str) -> Result<String, ServiceError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::EmptyMessage);
        }

        let reply = self
            .text
            .generate(&tutor_prompt(message), &[])
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;
        Ok(reply.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini_client::ImageAttachment;
    use crate::types::BoxError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, prompt: &str, images: &[ImageAttachment]) -> Result<String, BoxError> {
            assert!(images.is_empty());
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok("  Ownership means each value has one owner.\n".to_string())
        }
    }

    #[tokio::test]
    async fn test_reply_wraps_message_in_tutor_prompt() {
        let echo = Arc::new(Echo {
            last_prompt: Mutex::new(None),
        });
        let tutor = TutorService::new(echo.clone());

        let reply = tutor.reply("What is ownership?").await.unwrap();

        assert_eq!(reply, "Ownership means each value has one owner.");
        assert_eq!(
            echo.last_prompt.lock().unwrap().as_deref(),
            Some("Respond to the following message as a helpful AI tutor: \"What is ownership?\"")
        );
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_without_a_call() {
        let echo = Arc::new(Echo {
            last_prompt: Mutex::new(None),
        });
        let tutor = TutorService::new(echo.clone());

        assert!(matches!(tutor.reply("   ").await, Err(ServiceError::EmptyMessage)));
        assert!(echo.last_prompt.lock().unwrap().is_none());
    }
}

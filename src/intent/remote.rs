use reqwest::Client;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{IntentParser, KeywordIntentParser};
use crate::core::{IntentKind, ParsedIntent};
use crate::error::{Result, TollgateError};

/// Parser behind an HTTP endpoint (`POST {url}` with `{"text": ...}`),
/// typically backed by a language model. Any failure falls back to the
/// keyword parser so a task is never blocked on classification.
#[derive(Debug, Clone)]
pub struct RemoteIntentParser {
    client: Client,
    url: String,
}

impl RemoteIntentParser {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url: url.into(),
        }
    }

    async fn ask(&self, text: &str) -> Result<ParsedIntent> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| TollgateError::from_reqwest(&self.url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TollgateError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.url.clone(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let intent: ParsedIntent = response
            .json()
            .await
            .map_err(|e| TollgateError::Http(format!("{}: malformed intent: {e}", self.url)))?;
        if intent.kind == IntentKind::Action && intent.action.is_none() {
            return Err(TollgateError::Http(format!(
                "{}: action intent without an action",
                self.url
            )));
        }
        Ok(intent)
    }
}

impl IntentParser for RemoteIntentParser {
    fn parse<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedIntent>> + Send + 'a>> {
        Box::pin(async move {
            match self.ask(text).await {
                Ok(intent) => Ok(intent),
                Err(err) => {
                    tracing::warn!(url = %self.url, error = %err, "remote intent parser failed, using keywords");
                    Ok(KeywordIntentParser::classify(text))
                }
            }
        })
    }
}

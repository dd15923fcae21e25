use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::presence::types::{Notifier, NotifierUrl};

const MESSAGES_URL: &str = "https://api.pushover.net/1/messages.json";
const VALIDATE_URL: &str = "https://api.pushover.net/1/users/validate.json";

/// Sends notifications through the Pushover message API.
pub struct PushoverNotifier {
    client: Client,
    api_token: String,
    user_key: String,
}

impl PushoverNotifier {
    /// Builds a notifier from `PUSHOVER_API_TOKEN` / `PUSHOVER_USER_KEY`.
    /// Missing credentials are a valid no-op state, not an error.
    pub fn from_env() -> Option<Self> {
        let api_token = std::env::var("PUSHOVER_API_TOKEN").ok()?;
        let user_key = std::env::var("PUSHOVER_USER_KEY").ok()?;
        if api_token.is_empty() || user_key.is_empty() {
            return None;
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;

        info!("Pushover notifier configured");
        Some(Self {
            client,
            api_token,
            user_key,
        })
    }

    /// Checks the credentials against the Pushover validation endpoint.
    pub async fn validate(&self) -> bool {
        let result = self
            .client
            .post(VALIDATE_URL)
            .form(&[("token", &self.api_token), ("user", &self.user_key)])
            .send()
            .await;

        match result {
            Ok(response) => {
                debug!("Pushover key validation status: {}", response.status());
                response.status().is_success()
            }
            Err(e) => {
                warn!("Pushover key validation failed: {}", e);
                false
            }
        }
    }

    async fn send(
        &self,
        title: &str,
        message: &str,
        image: Option<&[u8]>,
        link: Option<&NotifierUrl>,
    ) -> reqwest::Result<reqwest::Response> {
        let mut form = Form::new()
            .text("token", self.api_token.clone())
            .text("user", self.user_key.clone())
            .text("title", title.to_string())
            .text("message", message.to_string());

        if let Some(link) = link {
            form = form
                .text("url", link.url.clone())
                .text("url_title", link.url_title.clone());
        }

        if let Some(image) = image {
            let part = Part::bytes(image.to_vec())
                .file_name("chrome.png")
                .mime_str("image/png")?;
            form = form.part("attachment", part);
        }

        self.client.post(MESSAGES_URL).multipart(form).send().await
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn notify(
        &self,
        title: &str,
        message: &str,
        image: Option<&[u8]>,
        link: Option<&NotifierUrl>,
    ) {
        match self.send(title, message, image, link).await {
            Ok(response) if response.status().is_success() => {
                debug!("Pushover notification delivered: {}", title);
            }
            Ok(response) => {
                warn!(
                    "Pushover rejected notification {:?}: {}",
                    title,
                    response.status()
                );
            }
            Err(e) => {
                warn!("Pushover notification failed: {}", e);
            }
        }
    }
}

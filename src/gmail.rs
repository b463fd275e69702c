use crate::address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking Gmail REST client, narrowed to the two calls the scan job
/// needs: paged id listing and per-message metadata.
pub struct GmailClient {
    agent: ureq::Agent,
    base: String,
    bearer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl GmailClient {
    /// The API base is overridable through `GMAIL_API_BASE` so the
    /// client can be pointed at a local stub.
    pub fn new(access_token: &str) -> GmailClient {
        let base = env::var("GMAIL_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        GmailClient {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base,
            bearer: format!("Bearer {}", access_token),
        }
    }

    /// Pages through the message list until `count` ids are collected
    /// or the mailbox runs out.
    pub fn list_message_ids(&self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .agent
                .get(&format!("{}/users/me/messages", self.base))
                .set("Authorization", &self.bearer)
                .query("maxResults", &PAGE_SIZE.to_string());
            if let Some(token) = &page_token {
                request = request.query("pageToken", token);
            }
            let page: MessageList = request
                .call()
                .context("failed to list messages")?
                .into_json()
                .context("malformed message list response")?;
            ids.extend(page.messages.into_iter().map(|message| message.id));
            page_token = page.next_page_token;
            if ids.len() >= count || page_token.is_none() {
                break;
            }
        }
        ids.truncate(count);
        Ok(ids)
    }

    /// The normalized sender of one message, if it has a `From` header.
    pub fn sender(&self, id: &str) -> Result<Option<String>> {
        let message: Message = self
            .agent
            .get(&format!("{}/users/me/messages/{}", self.base, id))
            .set("Authorization", &self.bearer)
            .query("format", "metadata")
            .query("metadataHeaders", "From")
            .call()
            .with_context(|| format!("failed to fetch message {}", id))?
            .into_json()
            .with_context(|| format!("malformed response for message {}", id))?;
        Ok(message
            .payload
            .into_iter()
            .flat_map(|payload| payload.headers)
            .find(|header| header.name.eq_ignore_ascii_case("From"))
            .map(|header| address::sender_address(&header.value)))
    }
}

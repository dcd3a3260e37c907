use crate::backup::function_path;
use crate::backup::notifications::Notification;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::Serialize;
use std::fmt::Display;
use std::time::Duration;

/// Discord rejects message content longer than this.
pub static DISCORD_MAX_CONTENT_CHARS: usize = 2000;
pub static DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts run summaries to a Discord-compatible webhook.
///
/// The request carries `{"content": "<text>"}`. Any 2xx response counts as
/// delivered. The whole request is bounded by `timeout` so a dead endpoint
/// cannot stall the backup schedule.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct DiscordWebhookConfig {
    #[builder(into)]
    url: String,
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
}

#[derive(Serialize)]
struct DiscordMessage<'a> {
    content: &'a str,
}

fn truncate_content(msg: &str) -> String {
    if msg.chars().count() <= DISCORD_MAX_CONTENT_CHARS {
        return msg.to_owned();
    }
    let mut out: String = msg.chars().take(DISCORD_MAX_CONTENT_CHARS - 3).collect();
    out.push_str("...");
    out
}

impl Notification for DiscordWebhookConfig {
    #[named]
    fn send<D: Display>(&self, msg: D) -> Result<()> {
        let content = truncate_content(&msg.to_string());
        tracing::debug!("Sending {} chars to webhook", content.chars().count());

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(Error::from)
            .add_fn_name(function_path!())?;

        let response = client
            .post(self.url.as_str())
            .json(&DiscordMessage { content: &content })
            .send()
            .map_err(Error::from)
            .add_msg("Failed to reach webhook")
            .add_fn_name(function_path!())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            Err(Error::webhook_status(status.as_u16(), body)).add_fn_name(function_path!())
        }
    }
}

use crate::backup::notifications::discord::DiscordWebhookConfig;
use crate::backup::result_error::result::Result;
use derive_more::From;
use std::fmt::Display;
use std::path::Path;

pub mod discord;

#[derive(Clone, From, Debug)]
pub enum NotificationConfig {
    Discord(DiscordWebhookConfig),
}

impl Notification for NotificationConfig {
    fn send<D: Display>(&self, msg: D) -> Result<()> {
        match self {
            Self::Discord(inner) => inner.send(msg),
        }
    }
}

pub trait Notification {
    fn send<D: Display>(&self, msg: D) -> Result<()>;
}

/// Replaces a leading home directory in every path mentioned in `text` with `~`.
///
/// A match only counts when it covers whole path components, so `/home/me`
/// never rewrites `/home/meadow` or `/data/home/me`.
pub fn redact_home<P: AsRef<Path>>(text: &str, home: Option<P>) -> String {
    let Some(home) = home else {
        return text.to_owned();
    };
    let home = home.as_ref().to_string_lossy();
    let home = home.trim_end_matches('/');
    if home.is_empty() {
        return text.to_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find(home) {
        let (before, after) = (&rest[..idx], &rest[idx + home.len()..]);
        let starts_path = before
            .chars()
            .next_back()
            .or_else(|| out.chars().next_back())
            .map_or(true, is_delimiter);
        let ends_component = after.chars().next().map_or(true, |c| c == '/' || is_delimiter(c));

        out.push_str(before);
        out.push_str(if starts_path && ends_component { "~" } else { home });
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Characters that may surround a path in a notification line.
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\'' | '"' | '`' | '(' | ')' | '[' | ']' | ',' | ':' | '*')
}

/// A single-request HTTP listener standing in for a webhook endpoint.
#[cfg(test)]
pub(crate) mod stub_webhook {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread::JoinHandle;

    /// Accepts one request, hands back its body and answers with `status_line`.
    pub fn one_shot_server(
        status_line: &'static str,
    ) -> (String, mpsc::Receiver<String>, JoinHandle<()>) {
        one_shot_server_with(status_line, || {})
    }

    /// Like [`one_shot_server`], running `before_reply` once the body is read
    /// and before the response goes out.
    pub fn one_shot_server_with<F>(
        status_line: &'static str,
        before_reply: F,
    ) -> (String, mpsc::Receiver<String>, JoinHandle<()>)
    where
        F: FnOnce() + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!(
            "http://{}/api/webhooks/1/token",
            listener.local_addr().unwrap()
        );
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            tx.send(String::from_utf8(body).unwrap()).unwrap();

            before_reply();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
        });
        (url, rx, handle)
    }
}

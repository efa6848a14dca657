use async_trait::async_trait;
use reflex_adapters::{Adapter, AdapterError, MessageAdapter};
use reflex_core::{Envelope, Method};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::debug;

/// Message adapter for a local terminal session: envelopes are printed to
/// stdout, one line per string.
pub struct ShellAdapter {
    name: String,
    out: Mutex<Stdout>,
}

impl ShellAdapter {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            name: bot_name.into(),
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    /// Lines printed for `envelope`.
    pub fn render(&self, envelope: &Envelope) -> Vec<String> {
        let to = envelope.user.as_ref().map(|u| u.name.as_str());
        envelope
            .strings
            .iter()
            .map(|text| match (envelope.method, to) {
                (Method::Reply, Some(name)) => format!("{}: @{} {}", self.name, name, text),
                (Method::Emote, _) => format!("* {} {}", self.name, text),
                (Method::Topic, _) => format!("[topic] {}", text),
                (Method::Notify, _) => format!("[notice] {}", text),
                _ => format!("{}: {}", self.name, text),
            })
            .collect()
    }
}

#[async_trait]
impl Adapter for ShellAdapter {
    fn name(&self) -> &str {
        "shell"
    }
}

#[async_trait]
impl MessageAdapter for ShellAdapter {
    async fn dispatch(&self, envelope: &Envelope) -> reflex_adapters::Result<Value> {
        let lines = self.render(envelope);
        let mut out = self.out.lock().await;
        for line in &lines {
            out.write_all(format!("{line}\n").as_bytes())
                .await
                .map_err(|e| AdapterError::DispatchFailed(e.to_string()))?;
        }
        out.flush()
            .await
            .map_err(|e| AdapterError::DispatchFailed(e.to_string()))?;
        debug!(envelope = %envelope.id, lines = lines.len(), "printed envelope");
        Ok(json!({ "lines": lines.len() }))
    }
}

#[cfg(test)]
mod tests {
    use reflex_core::{Room, User};

    use super::*;

    fn envelope(method: Method) -> Envelope {
        let mut e = Envelope::to_user(
            &User::new("u1", "alice").in_room(Room::new("shell")),
            method,
        );
        e.write(["hi", "there"]);
        e
    }

    #[test]
    fn renders_one_line_per_string() {
        let shell = ShellAdapter::new("reflex");
        assert_eq!(
            shell.render(&envelope(Method::Send)),
            vec!["reflex: hi", "reflex: there"]
        );
    }

    #[test]
    fn reply_and_emote_formats() {
        let shell = ShellAdapter::new("reflex");
        assert_eq!(shell.render(&envelope(Method::Reply))[0], "reflex: @alice hi");
        assert_eq!(shell.render(&envelope(Method::Emote))[0], "* reflex hi");
    }
}

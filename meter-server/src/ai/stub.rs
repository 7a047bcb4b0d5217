//! A scripted auditor used in tests and when no API key is configured, so
//! the session manager's canonical fallback path stays exercised.

use async_trait::async_trait;
use meter_core::AiAuditor;

pub struct StubAuditor {
    reply: String,
}

impl StubAuditor {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }
}

#[async_trait]
impl AiAuditor for StubAuditor {
    async fn respond(&self, _system_context: &str, _user_message: &str) -> anyhow::Result<String> {
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "stub-auditor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_returns_configured_reply() {
        let auditor = StubAuditor::new("acknowledged");
        let reply = auditor.respond("ctx", "hello").await.unwrap();
        assert_eq!(reply, "acknowledged");
        assert_eq!(auditor.model_name(), "stub-auditor");
    }
}

//! Outbound email composition and routing.
//!
//! Routing is a correctness property here, not a style choice. Owner
//! notifications go TO the internal operator inbox with the owner on BCC, so
//! the platform sees every lead even if direct owner delivery silently fails
//! and an owner reply-all can never leak the internal address to the guest.
//! Guest messages go TO the guest with the operator inbox on BCC, and their
//! reply-to is the resolved owner address or the public contact address,
//! never the operator inbox literal.

pub mod templates;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RoutingConfig;
use crate::store::{InquiryStore, Listing};

/// One outbound email, fully composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("mail transport failure: {0}")]
    Transport(String),
}

/// Narrow transport seam. The only assumption made of implementations is
/// that they report failures instead of panicking and are safe to await.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailerError>;
}

/// Subject plus both bodies for one message.
#[derive(Debug, Clone)]
pub struct OutboundContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Applies the routing rules above to composed content.
pub struct EmailRouter<M> {
    mailer: Arc<M>,
    routing: RoutingConfig,
}

impl<M: Mailer> EmailRouter<M> {
    pub fn new(mailer: Arc<M>, routing: RoutingConfig) -> Self {
        Self { mailer, routing }
    }

    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    /// Owner notification: TO operator inbox, BCC owner, reply-to guest.
    pub async fn send_owner_notification(
        &self,
        brand_name: &str,
        owner_email: Option<&str>,
        guest_email: &str,
        content: OutboundContent,
    ) -> Result<SendReceipt, MailerError> {
        let message = EmailMessage {
            to: self.routing.operator_inbox.clone(),
            cc: None,
            bcc: owner_email.map(str::to_string),
            subject: content.subject,
            html: content.html,
            text: content.text,
            reply_to: guest_email.to_string(),
            from_email: self.routing.from_email.clone(),
            from_name: brand_name.to_string(),
        };
        let receipt = self.mailer.send(&message).await?;
        tracing::info!(id = %receipt.id, bcc = ?message.bcc, "owner notification sent");
        Ok(receipt)
    }

    /// Guest message: TO guest, BCC operator inbox, reply-to the resolved
    /// owner address or the public contact address. A caller passing the
    /// operator inbox (or nothing) gets the public contact address instead;
    /// the internal address must never reach a guest-facing header.
    pub async fn send_guest_message(
        &self,
        brand_name: &str,
        guest_email: &str,
        reply_to: Option<&str>,
        content: OutboundContent,
    ) -> Result<SendReceipt, MailerError> {
        let reply_to = match reply_to {
            Some(address)
                if !address.trim().is_empty()
                    && !address.eq_ignore_ascii_case(&self.routing.operator_inbox) =>
            {
                address.to_string()
            }
            _ => self.routing.public_contact_email.clone(),
        };
        let message = EmailMessage {
            to: guest_email.to_string(),
            cc: None,
            bcc: Some(self.routing.operator_inbox.clone()),
            subject: content.subject,
            html: content.html,
            text: content.text,
            reply_to,
            from_email: self.routing.from_email.clone(),
            from_name: brand_name.to_string(),
        };
        let receipt = self.mailer.send(&message).await?;
        tracing::info!(id = %receipt.id, to = %guest_email, "guest message sent");
        Ok(receipt)
    }
}

/// Resolve the owner notification address for a listing: the referenced
/// Owner record's email when it exists, otherwise the configured fallback.
/// Lookup failures are logged and degrade to the fallback, never thrown.
pub async fn resolve_owner_email<S: InquiryStore + ?Sized>(
    listing: Option<&Listing>,
    store: &S,
    routing: &RoutingConfig,
) -> String {
    if let Some(owner_id) = listing.and_then(|listing| listing.owner_id.as_ref()) {
        match store.get_owner_by_id(owner_id).await {
            Ok(Some(owner)) if !owner.email.trim().is_empty() => return owner.email,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "owner lookup failed, using fallback address");
            }
        }
    }
    routing.owner_fallback_email.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingMailer {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<EmailMessage> {
            self.sent.lock().expect("mailer mutex poisoned").clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailerError> {
            self.sent
                .lock()
                .expect("mailer mutex poisoned")
                .push(message.clone());
            Ok(SendReceipt {
                id: "msg-1".to_string(),
            })
        }
    }

    fn routing() -> RoutingConfig {
        RoutingConfig {
            operator_inbox: "leads@platform.internal".to_string(),
            from_email: "bookings@platform.example".to_string(),
            from_name: "Platform".to_string(),
            owner_fallback_email: "leads@platform.internal".to_string(),
            public_contact_email: "concierge@platform.example".to_string(),
        }
    }

    fn content() -> OutboundContent {
        OutboundContent {
            subject: "subject".to_string(),
            html: "<p>body</p>".to_string(),
            text: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn owner_notification_routes_through_operator_inbox() {
        let mailer = Arc::new(RecordingMailer::new());
        let router = EmailRouter::new(mailer.clone(), routing());
        router
            .send_owner_notification(
                "Villa Azure",
                Some("owner@villa.example"),
                "guest@example.com",
                content(),
            )
            .await
            .expect("sends");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "leads@platform.internal");
        assert_eq!(sent[0].bcc.as_deref(), Some("owner@villa.example"));
        assert_eq!(sent[0].reply_to, "guest@example.com");
    }

    #[tokio::test]
    async fn guest_message_never_carries_operator_inbox_in_visible_headers() {
        let mailer = Arc::new(RecordingMailer::new());
        let router = EmailRouter::new(mailer.clone(), routing());

        // Explicit attempt to point reply-to at the internal inbox.
        router
            .send_guest_message(
                "Villa Azure",
                "guest@example.com",
                Some("leads@platform.internal"),
                content(),
            )
            .await
            .expect("sends");
        // And the no-reply-to default.
        router
            .send_guest_message("Villa Azure", "guest@example.com", None, content())
            .await
            .expect("sends");

        for message in mailer.sent() {
            assert_eq!(message.to, "guest@example.com");
            assert_ne!(message.reply_to, "leads@platform.internal");
            assert_eq!(message.reply_to, "concierge@platform.example");
            assert_eq!(message.bcc.as_deref(), Some("leads@platform.internal"));
        }
    }

    #[tokio::test]
    async fn guest_reply_to_prefers_resolved_owner() {
        let mailer = Arc::new(RecordingMailer::new());
        let router = EmailRouter::new(mailer.clone(), routing());
        router
            .send_guest_message(
                "Villa Azure",
                "guest@example.com",
                Some("owner@villa.example"),
                content(),
            )
            .await
            .expect("sends");
        assert_eq!(mailer.sent()[0].reply_to, "owner@villa.example");
    }
}

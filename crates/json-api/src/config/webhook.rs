//! Payment Webhook Config

use clap::Args;

/// Webhook verification settings.
#[derive(Debug, Args)]
pub struct WebhookConfig {
    /// Preshared HMAC-SHA256 secret for callback signatures. Unset disables
    /// verification (test mode only).
    #[arg(long, env = "WEBHOOK_HMAC_SECRET")]
    pub hmac_secret: Option<String>,

    /// Header carrying the callback signature.
    #[arg(
        long,
        env = "WEBHOOK_SIGNATURE_HEADER",
        default_value = "x-webhook-signature"
    )]
    pub signature_header: String,
}

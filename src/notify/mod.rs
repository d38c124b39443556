//! Result notifications: SMS through the relay, and share links.

mod share;
mod sms;

pub use share::{share_text, whatsapp_url};
pub use sms::{format_sms, normalize_phone, SmsError, SmsRelayClient};

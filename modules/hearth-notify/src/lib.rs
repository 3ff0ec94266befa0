pub mod channel;
pub mod email;
pub mod notifier;
pub mod responder;
pub mod sms;
pub mod token_store;

pub use channel::NotificationChannel;
pub use email::EmailChannel;
pub use notifier::Notifier;
pub use responder::{classify_response, ResponseClass};
pub use sms::SmsChannel;
pub use token_store::{MemoryTokenStore, OAuthToken, TokenStore};

pub mod session;
pub mod traits;
pub mod types;
pub mod webhook;

pub use traits::ChatProvider;
pub use types::ExchangeError;
pub use webhook::WebhookProvider;

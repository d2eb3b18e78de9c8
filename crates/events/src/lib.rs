//! Tribunal event bus and outbound notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the domain event envelope published after every
//!   successful proposal write.
//! - [`delivery`]: outbound webhook delivery with retry.
//! - [`WebhookNotifier`]: background task fanning proposal events out to the
//!   configured webhook URLs.

pub mod bus;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use notifier::WebhookNotifier;

pub mod events;
pub mod twitch;

pub use twitch::{BroadcasterCache, TwitchConnection, WebhookTarget};

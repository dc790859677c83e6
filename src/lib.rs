pub mod core;
pub mod player;
pub mod sim;

pub use crate::core::{PlayerConfig, PlayerError, PlayerEvent, PlayerState, Result};
pub use crate::player::{PlayerCallbacks, PlayerSession};

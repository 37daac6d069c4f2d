pub mod api;
pub mod models;

pub use api::SpotifyClient;
pub use models::{PlayerState, Track};

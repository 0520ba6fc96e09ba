pub mod artifact;
pub mod brief;
pub mod chat;
pub mod events;
pub mod history;
pub mod models;
pub mod prompt;
pub mod runs;

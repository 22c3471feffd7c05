pub mod account;
pub mod chat;
pub mod clerk;
pub mod events;
pub mod public;

pub mod attachment;
pub mod chat;

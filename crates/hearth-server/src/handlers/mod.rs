pub mod chat;
pub mod conversations;
pub mod files;
pub mod health;
pub mod models;
pub mod stop;

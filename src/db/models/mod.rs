mod application;
mod chat;
mod user;

pub use application::*;
pub use chat::*;
pub use user::*;

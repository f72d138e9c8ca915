// Services module - Business logic

pub mod activation;
pub mod key_admin;
pub mod key_format;
pub mod key_issuer;

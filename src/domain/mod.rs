pub mod admin;
pub mod advice;
pub mod comment;
pub mod follow;
pub mod moderation;
pub mod support;
pub mod user;

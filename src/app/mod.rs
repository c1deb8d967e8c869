pub mod admin;
pub mod advice;
pub mod auth;
pub mod follows;
pub mod lifecycle;
pub mod moderation;
pub mod sequence;
pub mod threads;
pub mod workspace;

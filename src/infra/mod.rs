pub mod notify;
pub mod session;
pub mod token_store;

pub mod atomic;
pub mod layout;

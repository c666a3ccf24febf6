pub(crate) mod address;
pub mod dns;
pub mod input;
pub mod smtp;

pub mod bitbus;
pub mod bitfs;
pub mod bitsocket;
mod session;

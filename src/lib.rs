#![doc = include_str!("RUSTDOC.md")]

pub mod app;
pub mod firestore;
pub mod platform;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

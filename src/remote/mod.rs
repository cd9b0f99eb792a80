// ABOUTME: Remote host access module
// ABOUTME: Everything that touches the source host goes through RemoteClient

pub mod client;

pub use client::RemoteClient;

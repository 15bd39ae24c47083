//! 调用方认证

pub mod identity;

pub use identity::{CallerIdentity, IdentityVerifier, StaticTokenVerifier};

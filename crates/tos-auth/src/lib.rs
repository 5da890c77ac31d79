//! TOS V4 request signing for the TOS Rust SDK.
//!
//! This crate implements the client side of TOS request authentication:
//! given a request description, a credential, and an injected timestamp it
//! produces either an `Authorization` header value for an inline signed
//! request or a self-contained presigned URL.
//!
//! The scheme is SigV4-shaped: a canonical request string is built from the
//! normalized method/path/query/headers and a payload hash, a signing key
//! is derived from the secret key, date, and region by an HMAC-SHA256
//! chain, and the hex HMAC of the string to sign is the signature.
//!
//! # Modules
//!
//! - [`credentials`] - credential snapshot and provider trait
//! - [`canonical`] - canonical request construction
//! - [`sign`] - inline signing ([`Signer::sign`])
//! - [`presigned`] - presigned URL generation ([`Signer::presign`])
//! - [`error`] - signing error types

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod presigned;
pub mod sign;

pub use credentials::{Credential, CredentialsProvider, StaticCredentialsProvider};
pub use error::AuthError;
pub use presigned::{PresignInput, PresignedUrl};
pub use sign::{SignableRequest, SignatureResult, Signer, UNSIGNED_PAYLOAD};

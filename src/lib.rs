//! # Paygate SDK
//!
//! Official Rust SDK for the Paygate payment gateway: client-side
//! tokenization of payment methods, transactions, preauthorizations and
//! device management.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paygate_sdk::{Mode, Paygate, PaymentMethod, PaymentParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Paygate::new(Default::default())?;
//!
//!     // Must happen before any other call. With no device id supplied, a
//!     // persisted one is reused or a fresh one is requested.
//!     client.initialize(Mode::Test, "tpk_test_1", None).await?;
//!
//!     // The preferred integration: tokenize on the device, charge from
//!     // your backend.
//!     let card = PaymentMethod::card("4242424242424242", 12, 2030, None, Some("123"));
//!     let token = client.generate_token(&card, None).await?;
//!     println!("send to your server: {token}");
//!
//!     // Or charge directly from the device.
//!     let params = PaymentParams::new(4200, "EUR").with_description("Order 17");
//!     let tx = client.transaction_with_method(&card, &params, false).await?;
//!     println!("charged: {}", tx.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `native-storage` (default): File-based device-id storage
//! - `native-tls` (default): Use native TLS for HTTPS
//! - `rustls-tls`: Use rustls for HTTPS (alternative to native-tls)
//!
//! ## Operation contract
//!
//! Every asynchronous operation resolves with exactly one outcome: the
//! typed result on success, a [`PaygateError`] carrying a
//! [`PaygateErrorCode`] otherwise. Composite operations (create a
//! transaction or preauthorization straight from a payment method) tokenize
//! first and short-circuit on failure, so they too report a single terminal
//! outcome. Requests with malformed input fail locally before any network
//! traffic. Tokens are single-use and consumption is one-way; both are
//! enforced by the gateway, and the SDK surfaces the gateway's verdict.

pub mod error;
pub mod paygate;
pub mod storage;
pub mod types;

// Main client
pub use paygate::{Paygate, PaygateOptions, DEFAULT_BASE_URL};

// Error types
pub use error::{PaygateError, PaygateErrorCode, Result};

// Storage
pub use storage::{MemoryStorage, StorageAdapter};

// Types
pub use types::{
    EntityStatus, InitDetails, InitOutcome, Mode, PaymentMethod, PaymentParams, Preauthorization,
    Transaction,
};

// Re-export storage implementations
#[cfg(feature = "native-storage")]
pub use storage::FileStorage;

//! # quickpay-rs
//!
//! A Rust client for the QuickPay payment gateway (protocol version 7).
//!
//! Every message exchanged with QuickPay carries an `md5check`: the MD5 digest
//! of a fixed list of field values followed by the merchant's shared secret.
//! This crate builds those messages, signs them, and checks the signature of
//! whatever comes back.
//!
//! ## Features
//!
//! - **Direct API**: authorize, capture, cancel, refund, recurring and subscribe
//!   requests, sent as form-encoded POSTs with XML replies
//! - **Hosted payment window**: signed hidden-input field sets for redirect flows
//! - **Callbacks**: parsing and validation of the fields QuickPay posts back,
//!   including merchant `CUSTOM_` fields
//! - **Typed setters**: each operation only exposes the fields it accepts
//!
//! ## Quick Start
//!
//! ### Direct API
//!
//! ```rust,no_run
//! use quickpay::config::Configuration;
//! use quickpay::request::CaptureRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::new(12345, "my-md5-secret");
//!
//! let mut capture = CaptureRequest::new(&config)?;
//! capture.set_transaction(77001).set_amount(12500);
//!
//! let response = capture.send().await?;
//! if response.is_valid() && response.is_success() {
//!     println!("captured {:?}", response.amount());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Hosted form and callback
//!
//! ```rust
//! use quickpay::checksum::Secret;
//! use quickpay::config::Configuration;
//! use quickpay::form::AuthorizeForm;
//! use quickpay::response::ParsedResponse;
//!
//! let config = Configuration::new(12345, "my-md5-secret");
//! let mut form = AuthorizeForm::new(&config).unwrap();
//! form.set_order_number("ORDER-1001")
//!     .set_amount(12500)
//!     .set_currency("DKK")
//!     .set_callback_url("https://shop.example/quickpay/callback");
//! let html = form.render().to_html();
//! assert!(html.contains("md5check"));
//!
//! // Later, in the callback handler:
//! let posted = "msgtype=authorize&ordernumber=ORDER-1001&qpstat=000&md5check=forged";
//! let secret = Secret::new("my-md5-secret");
//! let callback = ParsedResponse::from_form_body(posted, Some(secret)).unwrap();
//! assert!(!callback.is_valid());
//! ```
//!
//! ## Security
//!
//! - Always call [`ParsedResponse::is_valid`](response::ParsedResponse::is_valid)
//!   before acting on a callback. An unvalidated callback can be forged by anyone.
//! - The secret is wrapped in [`Secret`](checksum::Secret), which never appears
//!   in `Debug` output, logs or serialized replies.
//! - TLS certificate verification is on unless explicitly skipped.
//!
//! ## References
//!
//! - [QuickPay protocol v7](https://doc.quickpay.net/)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod checksum;
pub mod config;
pub mod errors;
pub mod fields;
pub mod form;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

// Re-export commonly used items
pub use checksum::Secret;
pub use config::Configuration;
pub use errors::{QuickpayError, Result};
pub use fields::{FieldSet, FieldValue};
pub use form::{AuthorizeForm, PaymentForm, RenderedForm, SubscribeForm};
pub use request::{
    ApiRequest, AuthorizeRequest, CancelRequest, CaptureRequest, RecurringRequest, RefundRequest,
    SignedRequest, SubscribeRequest,
};
pub use response::{ParsedResponse, ResponseKind};
pub use transport::{HttpTransport, Transport};
pub use types::{MessageType, StatusCode, PROTOCOL_VERSION};

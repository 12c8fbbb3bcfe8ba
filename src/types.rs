//! Core type definitions for the QuickPay protocol.
//!
//! This module holds the operation tags used to parameterise request and form
//! builders, the capability traits that decide which setters each operation
//! exposes, and the gateway's status-code table.

use std::fmt;
use std::str::FromStr;

/// Version of the QuickPay protocol spoken by this crate.
pub const PROTOCOL_VERSION: i64 = 7;

/// Channel sent with every direct API request unless overridden.
pub const DEFAULT_CHANNEL: &str = "creditcard";

/// Prefix marking merchant-defined fields in hosted forms and callbacks.
pub const CUSTOM_FIELD_PREFIX: &str = "CUSTOM_";

/// The `msgtype` discriminator of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Reserve an amount on a card
    Authorize,
    /// Withdraw a previously authorized amount
    Capture,
    /// Release an authorization
    Cancel,
    /// Return captured funds
    Refund,
    /// Charge a subscription
    Recurring,
    /// Create a subscription
    Subscribe,
}

impl MessageType {
    /// All message types, in protocol documentation order.
    pub const ALL: [MessageType; 6] = [
        MessageType::Authorize,
        MessageType::Capture,
        MessageType::Cancel,
        MessageType::Refund,
        MessageType::Recurring,
        MessageType::Subscribe,
    ];

    /// Wire name as used in the `msgtype` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Authorize => "authorize",
            MessageType::Capture => "capture",
            MessageType::Cancel => "cancel",
            MessageType::Refund => "refund",
            MessageType::Recurring => "recurring",
            MessageType::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown msgtype: {}", s))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// An operation tag usable with [`ApiRequest`](crate::request::ApiRequest).
pub trait Operation: sealed::Sealed + Send + Sync + 'static {
    /// The `msgtype` written by requests of this kind.
    const KIND: MessageType;
}

/// An operation the hosted payment window accepts.
pub trait FormOperation: Operation {}

/// Operations carrying an amount.
pub trait WithAmount: Operation {}

/// Operations referring to an existing transaction.
pub trait WithTransaction: Operation {}

/// Operations that start a new order (order number and currency).
pub trait WithOrder: Operation {}

/// Operations that can be captured immediately.
pub trait WithAutoCapture: Operation {}

/// Operations that carry card or SMS payment details.
pub trait WithCard: Operation {}

macro_rules! operation {
    ($(#[$doc:meta])* $name:ident => $kind:ident: $($cap:ident),*) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl Operation for $name {
            const KIND: MessageType = MessageType::$kind;
        }

        $(impl $cap for $name {})*
    };
}

operation!(
    /// Authorize a payment.
    Authorize => Authorize: FormOperation, WithAmount, WithOrder, WithAutoCapture, WithCard
);
operation!(
    /// Capture an authorized payment.
    Capture => Capture: WithAmount, WithTransaction
);
operation!(
    /// Cancel an authorization.
    Cancel => Cancel: WithTransaction
);
operation!(
    /// Refund a captured payment.
    Refund => Refund: WithAmount, WithTransaction
);
operation!(
    /// Charge an existing subscription.
    Recurring => Recurring: WithAmount, WithTransaction, WithOrder, WithAutoCapture
);
operation!(
    /// Create a subscription.
    Subscribe => Subscribe: FormOperation, WithAmount, WithOrder, WithCard
);

/// Outcome codes reported in the `qpstat` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 000
    Approved,
    /// 001
    RejectedByAcquirer,
    /// 002
    CommunicationError,
    /// 003
    CardExpired,
    /// 004
    TransitionNotAllowed,
    /// 005
    AuthorizationExpired,
    /// 006
    AcquirerError,
    /// 007
    GatewayError,
    /// 008
    RequestDataError,
    /// 009
    AbortedByShopper,
}

impl StatusCode {
    /// Looks up a three digit `qpstat` code.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "000" => StatusCode::Approved,
            "001" => StatusCode::RejectedByAcquirer,
            "002" => StatusCode::CommunicationError,
            "003" => StatusCode::CardExpired,
            "004" => StatusCode::TransitionNotAllowed,
            "005" => StatusCode::AuthorizationExpired,
            "006" => StatusCode::AcquirerError,
            "007" => StatusCode::GatewayError,
            "008" => StatusCode::RequestDataError,
            "009" => StatusCode::AbortedByShopper,
            _ => return None,
        })
    }

    /// The code as sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            StatusCode::Approved => "000",
            StatusCode::RejectedByAcquirer => "001",
            StatusCode::CommunicationError => "002",
            StatusCode::CardExpired => "003",
            StatusCode::TransitionNotAllowed => "004",
            StatusCode::AuthorizationExpired => "005",
            StatusCode::AcquirerError => "006",
            StatusCode::GatewayError => "007",
            StatusCode::RequestDataError => "008",
            StatusCode::AbortedByShopper => "009",
        }
    }

    /// Human readable description, as documented by the gateway.
    pub fn message(&self) -> &'static str {
        match self {
            StatusCode::Approved => "Approved",
            StatusCode::RejectedByAcquirer => {
                "Rejected by acquirer. See field \"chstat\" and \"chstatmsg\" for further explanation."
            }
            StatusCode::CommunicationError => "Communication error.",
            StatusCode::CardExpired => "Card expired.",
            StatusCode::TransitionNotAllowed => {
                "Transition is not allowed for transaction current state."
            }
            StatusCode::AuthorizationExpired => "Authorization is expired.",
            StatusCode::AcquirerError => "Error reported by acquirer.",
            StatusCode::GatewayError => "Error reported by QuickPay.",
            StatusCode::RequestDataError => "Error in request data.",
            StatusCode::AbortedByShopper => "Payment aborted by shopper",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.message())
    }
}

/// Browser details forwarded to the acquirer's fraud screening.
///
/// Every field is optional; unset ones are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FraudSignals {
    /// Shopper's IP address
    pub remote_addr: Option<String>,
    /// `Accept` header
    pub http_accept: Option<String>,
    /// `Accept-Language` header
    pub http_accept_language: Option<String>,
    /// `Accept-Encoding` header
    pub http_accept_encoding: Option<String>,
    /// `Accept-Charset` header
    pub http_accept_charset: Option<String>,
    /// `Referer` header
    pub http_referer: Option<String>,
    /// `User-Agent` header
    pub http_user_agent: Option<String>,
}

impl FraudSignals {
    /// Field names paired with their values.
    pub(crate) fn entries(&self) -> [(&'static str, Option<&String>); 7] {
        [
            ("fraud_remote_addr", self.remote_addr.as_ref()),
            ("fraud_http_accept", self.http_accept.as_ref()),
            ("fraud_http_accept_language", self.http_accept_language.as_ref()),
            ("fraud_http_accept_encoding", self.http_accept_encoding.as_ref()),
            ("fraud_http_accept_charset", self.http_accept_charset.as_ref()),
            ("fraud_http_referer", self.http_referer.as_ref()),
            ("fraud_http_user_agent", self.http_user_agent.as_ref()),
        ]
    }
}

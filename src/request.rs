//! Signed requests to the QuickPay API.
//!
//! One generic [`ApiRequest`] covers all six operations. The operation tag
//! (`Authorize`, `Capture`, ...) fixes the `msgtype` and decides, at compile
//! time, which setters are available:
//!
//! ```compile_fail
//! use quickpay::config::Configuration;
//! use quickpay::request::CancelRequest;
//!
//! let mut cancel = CancelRequest::new(&Configuration::new(1, "secret")).unwrap();
//! cancel.set_amount(100); // a cancel has no amount
//! ```

use crate::checksum::{self, Secret, API_REQUEST_FIELDS, MD5CHECK_FIELD};
use crate::config::Configuration;
use crate::errors::Result;
use crate::fields::{FieldSet, FieldValue};
use crate::response::ParsedResponse;
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    Authorize, Cancel, Capture, FraudSignals, MessageType, Operation, Recurring, Refund,
    Subscribe, WithAmount, WithAutoCapture, WithCard, WithOrder, WithTransaction,
    DEFAULT_CHANNEL, PROTOCOL_VERSION,
};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Authorize request.
pub type AuthorizeRequest = ApiRequest<Authorize>;
/// Capture request.
pub type CaptureRequest = ApiRequest<Capture>;
/// Cancel request.
pub type CancelRequest = ApiRequest<Cancel>;
/// Refund request.
pub type RefundRequest = ApiRequest<Refund>;
/// Recurring (subscription charge) request.
pub type RecurringRequest = ApiRequest<Recurring>;
/// Subscribe request.
pub type SubscribeRequest = ApiRequest<Subscribe>;

/// A request ready to go on the wire: every present field in template order,
/// followed by `md5check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pairs: Vec<(String, String)>,
}

impl SignedRequest {
    /// Field name/value pairs, `md5check` last.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The computed signature.
    pub fn md5check(&self) -> &str {
        self.get(MD5CHECK_FIELD).unwrap_or_default()
    }

    /// Encodes the request as an `application/x-www-form-urlencoded` body.
    pub fn to_form_body(&self) -> Result<String> {
        Ok(serde_urlencoded::to_string(&self.pairs)?)
    }
}

/// A direct API request for operation `K`.
///
/// Setters mutate the request in place and return it for chaining. Building
/// or sending never consumes the request and always signs the current
/// fields, so a request may be adjusted and sent again.
///
/// # Examples
///
/// ```
/// use quickpay::config::Configuration;
/// use quickpay::request::AuthorizeRequest;
///
/// let config = Configuration::new(12345, "s3cr3t");
/// let mut request = AuthorizeRequest::new(&config).unwrap();
/// request.set_amount(100).set_currency("EUR");
///
/// let signed = request.build();
/// // md5("7" + "creditcard" + "authorize" + "12345" + "100" + "EUR" + "0" + "0" + "s3cr3t")
/// assert_eq!(signed.md5check(), "fb9cddfeec8e13948164f8e760b73ef9");
/// ```
pub struct ApiRequest<K: Operation> {
    fields: FieldSet,
    secret: Secret,
    api_url: Url,
    verify_tls: bool,
    timeout: Option<Duration>,
    _kind: PhantomData<K>,
}

impl<K: Operation> fmt::Debug for ApiRequest<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("msgtype", &K::KIND)
            .field("fields", &self.fields)
            .field("api_url", &self.api_url.as_str())
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<K: Operation> ApiRequest<K> {
    /// Creates a request, filling unset configuration from the process-wide defaults.
    ///
    /// Fails with a configuration error when no merchant id or secret can be found.
    pub fn new(config: &Configuration) -> Result<Self> {
        let resolved = config.resolve()?;

        let mut fields = FieldSet::declared(API_REQUEST_FIELDS.iter().copied());
        fields
            .set("protocol", PROTOCOL_VERSION)
            .set("channel", DEFAULT_CHANNEL)
            .set("msgtype", K::KIND.as_str())
            .set("merchant", resolved.merchant_id)
            .set("autocapture", false)
            .set("testmode", false);
        if let Some(api_key) = &resolved.api_key {
            fields.set("apikey", api_key);
        }

        Ok(Self {
            fields,
            secret: resolved.secret,
            api_url: resolved.api_url,
            verify_tls: true,
            timeout: None,
            _kind: PhantomData,
        })
    }

    /// Creates a request purely from the process-wide defaults.
    pub fn with_defaults() -> Result<Self> {
        Self::new(&Configuration::empty())
    }

    pub(crate) fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) -> &mut Self {
        debug_assert!(API_REQUEST_FIELDS.contains(&name));
        self.fields.set(name, value);
        self
    }

    /// The operation this request performs.
    pub fn message_type(&self) -> MessageType {
        K::KIND
    }

    /// Current field values.
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Endpoint the request is sent to.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Runs the request in the gateway's test mode.
    pub fn enable_testmode(&mut self) -> &mut Self {
        self.set_field("testmode", true)
    }

    /// Sets the API key. Only needed when the calling IP is not whitelisted.
    pub fn set_api_key(&mut self, api_key: &str) -> &mut Self {
        self.set_field("apikey", api_key)
    }

    /// Disables TLS certificate verification for [`ApiRequest::send`].
    ///
    /// Not recommended: anyone able to intercept the connection sees the card data.
    pub fn skip_ssl_verification(&mut self) -> &mut Self {
        warn!(url = %self.api_url, "TLS certificate verification disabled");
        self.verify_tls = false;
        self
    }

    /// Limits how long [`ApiRequest::send`] waits for the gateway.
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Signs the current fields.
    ///
    /// The signature covers every present field, walked in template order.
    pub fn build(&self) -> SignedRequest {
        let md5check = checksum::sign(&self.fields, API_REQUEST_FIELDS, &self.secret);

        let mut pairs = self.fields.to_pairs();
        pairs.push((MD5CHECK_FIELD.to_string(), md5check));

        debug!(msgtype = %K::KIND, fields = pairs.len(), "built signed request");
        SignedRequest { pairs }
    }

    /// Sends the request over HTTPS and parses the XML reply.
    ///
    /// The reply keeps this request's secret, so `is_valid()` can be called on it directly.
    #[instrument(skip(self), fields(msgtype = %K::KIND, url = %self.api_url))]
    pub async fn send(&self) -> Result<ParsedResponse> {
        let transport = HttpTransport::build(self.verify_tls, self.timeout)?;
        self.send_with(&transport).await
    }

    /// Sends the request through a caller-supplied transport.
    pub async fn send_with(&self, transport: &dyn Transport) -> Result<ParsedResponse> {
        let body = self.build().to_form_body()?;
        let reply = transport.post_form(&self.api_url, body).await?;
        let response = ParsedResponse::from_xml(&reply, Some(self.secret.clone()))?;

        info!(
            msgtype = %K::KIND,
            qpstat = response.qpstat().unwrap_or_default(),
            "gateway replied"
        );
        Ok(response)
    }
}

impl<K: WithAmount> ApiRequest<K> {
    /// Amount in minor units (e.g. øre, cents).
    pub fn set_amount(&mut self, amount: i64) -> &mut Self {
        self.set_field("amount", amount)
    }
}

impl<K: WithTransaction> ApiRequest<K> {
    /// The transaction id the operation applies to.
    pub fn set_transaction(&mut self, transaction: i64) -> &mut Self {
        self.set_field("transaction", transaction)
    }
}

impl<K: WithOrder> ApiRequest<K> {
    /// Merchant order number, 4 to 20 characters.
    pub fn set_order_number(&mut self, order_number: &str) -> &mut Self {
        self.set_field("ordernumber", order_number)
    }

    /// ISO 4217 currency code.
    pub fn set_currency(&mut self, currency: &str) -> &mut Self {
        self.set_field("currency", currency)
    }
}

impl<K: WithAutoCapture> ApiRequest<K> {
    /// Capture immediately after a successful authorization.
    pub fn set_auto_capture(&mut self, auto_capture: bool) -> &mut Self {
        self.set_field("autocapture", auto_capture)
    }
}

impl<K: WithCard> ApiRequest<K> {
    /// Card number.
    pub fn set_card_number(&mut self, card_number: &str) -> &mut Self {
        self.set_field("cardnumber", card_number)
    }

    /// Expiry as `YYMM`.
    pub fn set_expiration_date(&mut self, expiration_date: &str) -> &mut Self {
        self.set_field("expirationdate", expiration_date)
    }

    /// Card verification digits.
    pub fn set_cvd(&mut self, cvd: &str) -> &mut Self {
        self.set_field("cvd", cvd)
    }

    /// Mobile number for SMS payments.
    pub fn set_mobile_number(&mut self, number: &str) -> &mut Self {
        self.set_field("mobilenumber", number)
    }

    /// Text of the payment SMS.
    pub fn set_sms_message(&mut self, message: &str) -> &mut Self {
        self.set_field("smsmessage", message)
    }

    /// Comma separated acquirers to try.
    pub fn set_acquirers(&mut self, acquirers: &str) -> &mut Self {
        self.set_field("acquirers", acquirers)
    }

    /// Restrict the accepted card types.
    pub fn set_card_type_lock(&mut self, card_type_lock: &str) -> &mut Self {
        self.set_field("cardtypelock", card_type_lock)
    }

    /// Ask the gateway to return a card hash.
    pub fn set_card_hash(&mut self, card_hash: bool) -> &mut Self {
        self.set_field("cardhash", card_hash)
    }
}

impl ApiRequest<Authorize> {
    /// Payment channel, `creditcard` by default.
    pub fn set_channel(&mut self, channel: &str) -> &mut Self {
        self.set_field("channel", channel)
    }

    /// Allow the authorized amount to be captured in several parts.
    pub fn set_split_payment(&mut self, split: bool) -> &mut Self {
        self.set_field("splitpayment", split)
    }

    /// Forwards the shopper's browser details for fraud screening.
    ///
    /// Unset signals clear any previously set value.
    pub fn set_fraud_info(&mut self, signals: &FraudSignals) -> &mut Self {
        for (name, value) in signals.entries() {
            self.fields.set_opt(name, value);
        }
        self
    }
}

impl ApiRequest<Capture> {
    /// Close the transaction after this capture, releasing any remainder.
    pub fn set_finalize(&mut self, finalize: bool) -> &mut Self {
        self.set_field("finalize", finalize)
    }
}

impl ApiRequest<Subscribe> {
    /// Subscription description shown in the QuickPay manager.
    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.set_field("description", description)
    }
}

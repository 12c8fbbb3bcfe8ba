//! Hosted payment window forms.
//!
//! Instead of handling card data itself, the merchant renders an HTML form
//! that posts to the QuickPay payment window. The form's hidden inputs are
//! signed with the same `md5check` scheme as API requests, but only the
//! fields listed in [`FORM_FIELDS`] are signed or sent. Custom fields ride
//! along unsigned and come back in the callback.

use crate::checksum::{self, Secret, FORM_FIELDS, MD5CHECK_FIELD};
use crate::config::Configuration;
use crate::errors::Result;
use crate::fields::{FieldSet, FieldValue};
use crate::types::{
    Authorize, FormOperation, MessageType, Subscribe, CUSTOM_FIELD_PREFIX, PROTOCOL_VERSION,
};
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;
use url::Url;

/// Hosted authorize form.
pub type AuthorizeForm = PaymentForm<Authorize>;
/// Hosted subscribe form.
pub type SubscribeForm = PaymentForm<Subscribe>;

/// One `<input type="hidden">`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenInput {
    /// Input name
    pub name: String,
    /// Input value, unescaped
    pub value: String,
}

impl HiddenInput {
    /// Renders the input with both attributes HTML-escaped.
    pub fn to_html(&self) -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            escape_attribute(&self.name),
            escape_attribute(&self.value)
        )
    }
}

fn escape_attribute(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// The signed field set of a payment form, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedForm {
    /// Where the form must be posted
    pub action: Url,
    /// Whitelisted fields in canonical order, then `md5check`, then custom fields
    pub inputs: Vec<HiddenInput>,
}

impl RenderedForm {
    /// Looks up an input value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|input| input.name == name)
            .map(|input| input.value.as_str())
    }

    /// The form's signature.
    pub fn md5check(&self) -> &str {
        self.get(MD5CHECK_FIELD).unwrap_or_default()
    }

    /// Concatenated hidden inputs, without the surrounding `<form>`.
    pub fn to_html(&self) -> String {
        self.inputs.iter().map(HiddenInput::to_html).collect()
    }
}

/// A hosted payment window form for operation `K`.
///
/// # Examples
///
/// ```
/// use quickpay::config::Configuration;
/// use quickpay::form::AuthorizeForm;
///
/// let mut form = AuthorizeForm::new(&Configuration::new(12345, "s3cr3t")).unwrap();
/// form.set_order_number("ORDER-1001")
///     .set_amount(100)
///     .set_currency("DKK")
///     .set_custom("basket", "42");
///
/// let rendered = form.render();
/// assert_eq!(rendered.action.as_str(), "https://secure.quickpay.dk/form/");
/// assert_eq!(rendered.inputs.last().unwrap().name, "CUSTOM_basket");
/// ```
pub struct PaymentForm<K: FormOperation> {
    fields: FieldSet,
    custom: FieldSet,
    secret: Secret,
    action: Url,
    _kind: PhantomData<K>,
}

impl<K: FormOperation> fmt::Debug for PaymentForm<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentForm")
            .field("msgtype", &K::KIND)
            .field("fields", &self.fields)
            .field("custom", &self.custom)
            .field("action", &self.action.as_str())
            .finish_non_exhaustive()
    }
}

impl<K: FormOperation> PaymentForm<K> {
    /// Creates a form, filling unset configuration from the process-wide defaults.
    pub fn new(config: &Configuration) -> Result<Self> {
        let resolved = config.resolve()?;

        let mut fields = FieldSet::new();
        fields
            .set("testmode", 0)
            .set("protocol", PROTOCOL_VERSION)
            .set("merchant", resolved.merchant_id)
            .set("msgtype", K::KIND.as_str());

        Ok(Self {
            fields,
            custom: FieldSet::new(),
            secret: resolved.secret,
            action: resolved.form_url,
            _kind: PhantomData,
        })
    }

    /// Creates a form purely from the process-wide defaults.
    pub fn with_defaults() -> Result<Self> {
        Self::new(&Configuration::empty())
    }

    /// The operation the form starts.
    pub fn message_type(&self) -> MessageType {
        K::KIND
    }

    /// URL the form must be posted to.
    pub fn form_action(&self) -> &Url {
        &self.action
    }

    /// Current plain fields, including any that will not be rendered.
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Sets any field by name.
    ///
    /// Names outside [`FORM_FIELDS`] are stored but neither signed nor
    /// rendered; use [`PaymentForm::set_custom`] for merchant data.
    pub fn set_field(&mut self, name: &str, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.set(name, value);
        self
    }

    /// Sets several fields at once.
    pub fn set_fields<I, N, V>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<FieldValue>,
    {
        for (name, value) in fields {
            self.fields.set(name.as_ref(), value);
        }
        self
    }

    /// Adds an unsigned merchant field, sent as `CUSTOM_<name>`.
    pub fn set_custom(&mut self, name: &str, value: impl Into<FieldValue>) -> &mut Self {
        self.custom.set(&format!("{}{}", CUSTOM_FIELD_PREFIX, name), value);
        self
    }

    /// Payment window language, e.g. `da` or `en`.
    pub fn set_language(&mut self, code: &str) -> &mut Self {
        self.set_field("language", code)
    }

    /// Merchant order number, 4 to 20 characters.
    pub fn set_order_number(&mut self, order_number: &str) -> &mut Self {
        self.set_field("ordernumber", order_number)
    }

    /// Amount in minor units.
    pub fn set_amount(&mut self, amount: i64) -> &mut Self {
        self.set_field("amount", amount)
    }

    /// ISO 4217 currency code.
    pub fn set_currency(&mut self, currency: &str) -> &mut Self {
        self.set_field("currency", currency)
    }

    /// Where the shopper lands after a completed payment.
    pub fn set_continue_url(&mut self, url: &str) -> &mut Self {
        self.set_field("continueurl", url)
    }

    /// Where the shopper lands after cancelling.
    pub fn set_cancel_url(&mut self, url: &str) -> &mut Self {
        self.set_field("cancelurl", url)
    }

    /// Where the gateway posts the asynchronous result.
    pub fn set_callback_url(&mut self, url: &str) -> &mut Self {
        self.set_field("callbackurl", url)
    }

    /// Restrict the accepted card types.
    pub fn set_card_type_lock(&mut self, cards: &str) -> &mut Self {
        self.set_field("cardtypelock", cards)
    }

    /// Free text description.
    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.set_field("description", description)
    }

    /// Seconds the shopper has to complete the payment.
    pub fn set_deadline(&mut self, seconds: u32) -> &mut Self {
        self.set_field("deadline", seconds)
    }

    /// Capture right after authorization.
    pub fn enable_autocapture(&mut self) -> &mut Self {
        self.set_field("autocapture", 1)
    }

    /// Add the card fee to the amount.
    pub fn enable_autofee(&mut self) -> &mut Self {
        self.set_field("autofee", 1)
    }

    /// Use the gateway's test mode.
    pub fn enable_testmode(&mut self) -> &mut Self {
        self.set_field("testmode", 1)
    }

    /// Allow capturing in several parts.
    pub fn enable_split_payment(&mut self) -> &mut Self {
        self.set_field("splitpayment", 1)
    }

    /// Ask for a card hash in the callback.
    pub fn include_card_hash(&mut self) -> &mut Self {
        self.set_field("cardhash", 1)
    }

    /// Always show the mobile payment window.
    pub fn force_mobile(&mut self) -> &mut Self {
        self.set_field("forcemobile", 1)
    }

    /// Signs the whitelisted fields and lays out the hidden inputs.
    ///
    /// Works on the current state every time, so later setters are reflected
    /// in the next call.
    pub fn render(&self) -> RenderedForm {
        let md5check = checksum::sign(&self.fields, FORM_FIELDS, &self.secret);

        let mut inputs: Vec<HiddenInput> = FORM_FIELDS
            .iter()
            .filter_map(|name| {
                self.fields.get(name).map(|value| HiddenInput {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            })
            .collect();
        inputs.push(HiddenInput {
            name: MD5CHECK_FIELD.to_string(),
            value: md5check,
        });
        inputs.extend(self.custom.iter().map(|(name, value)| HiddenInput {
            name: name.to_string(),
            value: value.to_string(),
        }));

        debug!(msgtype = %K::KIND, inputs = inputs.len(), "rendered payment form");
        RenderedForm {
            action: self.action.clone(),
            inputs,
        }
    }
}

impl PaymentForm<Subscribe> {
    /// Subscription group.
    pub fn set_group(&mut self, group: &str) -> &mut Self {
        self.set_field("group", group)
    }
}

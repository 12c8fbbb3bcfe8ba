//! The `md5check` signature shared by every QuickPay message.
//!
//! A signature is the MD5 digest, as lowercase hex, of the values of a fixed
//! list of fields concatenated without separators and immediately followed by
//! the merchant's secret. Fields that are absent contribute nothing at all.
//!
//! Each direction has its own canonical list. The lists below are the order in
//! which the gateway itself walks the fields, so they must never be replaced by
//! the iteration order of a [`FieldSet`].

use crate::fields::FieldSet;
use std::fmt;

/// Name of the field carrying the signature in every payload.
pub const MD5CHECK_FIELD: &str = "md5check";

/// Direct API request template, in declaration order.
pub const API_REQUEST_FIELDS: &[&str] = &[
    "protocol",
    "channel",
    "msgtype",
    "merchant",
    "ordernumber",
    "amount",
    "currency",
    "autocapture",
    "cardnumber",
    "expirationdate",
    "cvd",
    "mobilenumber",
    "smsmessage",
    "acquirers",
    "cardtypelock",
    "transaction",
    "description",
    "group",
    "splitpayment",
    "finalize",
    "cardhash",
    "testmode",
    "fraud_remote_addr",
    "fraud_http_accept",
    "fraud_http_accept_language",
    "fraud_http_accept_encoding",
    "fraud_http_accept_charset",
    "fraud_http_referer",
    "fraud_http_user_agent",
    "apikey",
];

/// Hosted payment form fields that are signed. Anything else is never sent.
pub const FORM_FIELDS: &[&str] = &[
    "protocol",
    "msgtype",
    "merchant",
    "language",
    "ordernumber",
    "amount",
    "currency",
    "continueurl",
    "cancelurl",
    "callbackurl",
    "autocapture",
    "autofee",
    "cardtypelock",
    "description",
    "group",
    "testmode",
    "splitpayment",
    "forcemobile",
    "deadline",
    "cardhash",
];

/// Fields of an XML reply to a direct API call.
pub const API_RESPONSE_FIELDS: &[&str] = &[
    "msgtype",
    "ordernumber",
    "amount",
    "currency",
    "time",
    "state",
    "qpstat",
    "qpstatmsg",
    "chstat",
    "chstatmsg",
    "merchant",
    "merchantemail",
    "transaction",
    "cardtype",
    "cardnumber",
    "cardhash",
    "cardexpire",
    "acquirer",
    "splitpayment",
    "fraudprobability",
    "fraudremarks",
    "fraudreport",
];

/// Fields posted back by the hosted form (redirect or callback).
///
/// Same as [`API_RESPONSE_FIELDS`] with `fee` appended.
pub const CALLBACK_RESPONSE_FIELDS: &[&str] = &[
    "msgtype",
    "ordernumber",
    "amount",
    "currency",
    "time",
    "state",
    "qpstat",
    "qpstatmsg",
    "chstat",
    "chstatmsg",
    "merchant",
    "merchantemail",
    "transaction",
    "cardtype",
    "cardnumber",
    "cardhash",
    "cardexpire",
    "acquirer",
    "splitpayment",
    "fraudprobability",
    "fraudremarks",
    "fraudreport",
    "fee",
];

/// The merchant's shared secret.
///
/// Never transmitted, never serialized, and redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret string.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret. Only the checksum code should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True for a zero-length secret.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

/// Concatenation of the present values in `order`, followed by the secret.
fn signable_string(fields: &FieldSet, order: &[&str], secret: &Secret) -> String {
    let mut acc = String::new();
    for name in order {
        if let Some(value) = fields.get(name) {
            acc.push_str(&value.to_string());
        }
    }
    acc.push_str(secret.expose());
    acc
}

/// Computes the signature of `fields` over the canonical `order`.
///
/// # Examples
///
/// ```
/// use quickpay::checksum::{sign, Secret};
/// use quickpay::fields::FieldSet;
///
/// let mut fields = FieldSet::new();
/// fields.set("a", "1").set("c", "3");
///
/// // md5("13" + "s3cr3t")
/// let signature = sign(&fields, &["a", "b", "c"], &Secret::new("s3cr3t"));
/// assert_eq!(signature, "8e739f88e40fa0802070d7a7a9c26969");
/// ```
pub fn sign(fields: &FieldSet, order: &[&str], secret: &Secret) -> String {
    let digest = md5::compute(signable_string(fields, order, secret).as_bytes());
    hex::encode(digest.0)
}

/// Recomputes the signature and compares it to `claimed`.
///
/// The comparison is exact, so an upper-case hex signature does not match.
/// The `md5check` field itself is on no canonical list and therefore never
/// feeds into the recomputation.
pub fn verify(fields: &FieldSet, order: &[&str], secret: &Secret, claimed: &str) -> bool {
    debug_assert!(!order.contains(&MD5CHECK_FIELD));
    sign(fields, order, secret) == claimed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> FieldSet {
        let mut fields = FieldSet::declared(["a", "b", "c"]);
        fields.set("a", "1").set("c", "3");
        fields
    }

    #[test]
    fn test_known_answer() {
        let secret = Secret::new("s3cr3t");
        assert_eq!(
            sign(&abc(), &["a", "b", "c"], &secret),
            "8e739f88e40fa0802070d7a7a9c26969"
        );
        assert_eq!(
            sign(&FieldSet::new(), &[], &Secret::new("abcdefghijklmnopqrstuvwxyz")),
            "c3fcd3d76192e4007dfb496cca67e13b"
        );
    }

    #[test]
    fn test_absent_field_is_skipped() {
        let secret = Secret::new("s3cr3t");
        let mut without_b = FieldSet::new();
        without_b.set("a", "1").set("c", "3");

        assert_eq!(
            sign(&abc(), &["a", "b", "c"], &secret),
            sign(&without_b, &["a", "b", "c"], &secret)
        );
    }

    #[test]
    fn test_empty_string_contributes_nothing_but_is_present() {
        let secret = Secret::new("s3cr3t");
        let mut with_empty = abc();
        with_empty.set("b", "");

        assert!(with_empty.contains("b"));
        assert_eq!(
            sign(&with_empty, &["a", "b", "c"], &secret),
            sign(&abc(), &["a", "b", "c"], &secret)
        );
    }

    #[test]
    fn test_insertion_order_is_irrelevant() {
        let secret = Secret::new("s3cr3t");
        let mut reversed = FieldSet::new();
        reversed.set("c", "3").set("a", "1");

        assert_eq!(
            sign(&reversed, &["a", "b", "c"], &secret),
            "8e739f88e40fa0802070d7a7a9c26969"
        );
    }

    #[test]
    fn test_canonical_order_matters() {
        let secret = Secret::new("s3cr3t");
        assert_ne!(
            sign(&abc(), &["a", "c"], &secret),
            sign(&abc(), &["c", "a"], &secret)
        );
    }

    #[test]
    fn test_fields_outside_order_are_ignored() {
        let secret = Secret::new("s3cr3t");
        let mut noisy = abc();
        noisy.set("unknown", "999");

        assert_eq!(
            sign(&noisy, &["a", "b", "c"], &secret),
            sign(&abc(), &["a", "b", "c"], &secret)
        );
    }

    #[test]
    fn test_secret_changes_signature() {
        let order = ["a", "b", "c"];
        let one = sign(&abc(), &order, &Secret::new("s3cr3t"));
        let other = sign(&abc(), &order, &Secret::new("other"));
        assert_ne!(one, other);
        assert_eq!(other, "2f2ab638c685d199020d91cc2e6f99d6");
    }

    #[test]
    fn test_verify_roundtrip_and_exact_match() {
        let order = ["a", "b", "c"];
        let secret = Secret::new("s3cr3t");
        let signature = sign(&abc(), &order, &secret);

        assert!(verify(&abc(), &order, &secret, &signature));
        assert!(!verify(&abc(), &order, &secret, &signature.to_uppercase()));
        assert!(!verify(&abc(), &order, &Secret::new("wrong"), &signature));
    }

    #[test]
    fn test_verify_ignores_md5check_slot() {
        let order = ["a", "b", "c"];
        let secret = Secret::new("s3cr3t");
        let mut signed = abc();
        let signature = sign(&signed, &order, &secret);
        signed.set(MD5CHECK_FIELD, signature.clone());

        assert!(verify(&signed, &order, &secret, &signature));
    }

    #[test]
    fn test_integer_values_render_decimal() {
        let secret = Secret::new("s3cr3t");
        let mut ints = FieldSet::new();
        ints.set("a", 1).set("c", 3);
        assert_eq!(
            sign(&ints, &["a", "b", "c"], &secret),
            sign(&abc(), &["a", "b", "c"], &secret)
        );
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("s3cr3t");
        assert_eq!(format!("{:?}", secret), "Secret([REDACTED])");
        assert!(!format!("{:?}", Some(secret)).contains("s3cr3t"));
    }

    #[test]
    fn test_callback_list_extends_api_list() {
        assert_eq!(API_RESPONSE_FIELDS.len(), 22);
        assert_eq!(&CALLBACK_RESPONSE_FIELDS[..22], API_RESPONSE_FIELDS);
        assert_eq!(CALLBACK_RESPONSE_FIELDS[22], "fee");
        assert_eq!(FORM_FIELDS.len(), 20);
    }
}

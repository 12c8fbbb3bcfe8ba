//! Gateway replies: XML answers to direct API calls and form posts from the
//! hosted payment window (redirects and asynchronous callbacks).
//!
//! Both shapes end up in a [`ParsedResponse`]. Nothing in a reply should be
//! trusted before [`ParsedResponse::is_valid`] has returned `true`; a forged
//! callback is the main attack this checksum exists to stop.

use crate::checksum::{
    self, Secret, API_RESPONSE_FIELDS, CALLBACK_RESPONSE_FIELDS, MD5CHECK_FIELD,
};
use crate::config;
use crate::errors::{QuickpayError, Result};
use crate::fields::{FieldSet, FieldValue};
use crate::types::{MessageType, StatusCode, CUSTOM_FIELD_PREFIX};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use quick_xml::{events::Event, Reader};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Reply fields that carry integers.
const INTEGER_FIELDS: &[&str] = &["amount", "transaction", "splitpayment", "fee"];

/// Where a reply came from. Each shape has its own canonical field list.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// XML body answering a direct API request
    Api,
    /// Form fields posted by the hosted payment window
    Callback,
}

impl ResponseKind {
    /// The fields covered by this shape's `md5check`.
    pub fn canonical_fields(&self) -> &'static [&'static str] {
        match self {
            ResponseKind::Api => API_RESPONSE_FIELDS,
            ResponseKind::Callback => CALLBACK_RESPONSE_FIELDS,
        }
    }
}

/// Collects the text of every direct child of the root element, keyed by
/// element name. Text is kept byte for byte (no trimming) so the values match
/// what the gateway signed. Entities are unescaped and CDATA is taken as is.
fn read_reply_elements(body: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(body);
    let mut values = HashMap::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                depth += 1;
                seen_root = true;
                if depth == 2 {
                    current = Some(element_name(start.local_name().as_ref()));
                    text.clear();
                }
            }
            Ok(Event::Empty(start)) => {
                seen_root = true;
                if depth == 1 {
                    values.insert(element_name(start.local_name().as_ref()), String::new());
                }
            }
            Ok(Event::Text(chunk)) if depth == 2 => {
                let unescaped = chunk.unescape().map_err(|e| QuickpayError::protocol(e, body))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(chunk)) if depth == 2 => {
                text.push_str(&String::from_utf8_lossy(&chunk.into_inner()));
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    if let Some(name) = current.take() {
                        values.insert(name, std::mem::take(&mut text));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(QuickpayError::protocol(e, body)),
        }
    }

    if !seen_root || depth != 0 {
        return Err(QuickpayError::protocol("reply is not a complete XML document", body));
    }
    Ok(values)
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Callback and reply fields serialized as numbers when they hold integers.
fn serialize_reply_fields<S: Serializer>(
    fields: &FieldSet,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (name, value) in fields.iter() {
        match value.as_integer() {
            Some(number) if INTEGER_FIELDS.contains(&name) => map.serialize_entry(name, &number)?,
            _ => map.serialize_entry(name, value)?,
        }
    }
    map.end()
}

/// A reply from the gateway, read-only once parsed.
#[derive(Serialize, Debug, Clone)]
pub struct ParsedResponse {
    kind: ResponseKind,
    #[serde(serialize_with = "serialize_reply_fields")]
    fields: FieldSet,
    custom: BTreeMap<String, String>,
    #[serde(skip)]
    secret: Option<Secret>,
}

impl ParsedResponse {
    fn empty(kind: ResponseKind, secret: Option<Secret>) -> Self {
        let names = kind
            .canonical_fields()
            .iter()
            .copied()
            .chain(std::iter::once(MD5CHECK_FIELD));

        Self {
            kind,
            fields: FieldSet::declared(names),
            custom: BTreeMap::new(),
            secret,
        }
    }

    /// Parses the XML body returned by a direct API call.
    ///
    /// Element text is kept exactly as sent, surrounding whitespace included.
    /// `amount`, `transaction` and `splitpayment` are stored as integers, or
    /// left absent when the element is empty. Every other element is kept as
    /// text, an empty string when the element is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use quickpay::response::ParsedResponse;
    ///
    /// let body = "<?xml version=\"1.0\"?><response><msgtype>capture</msgtype>\
    ///             <amount>250</amount><qpstat>000</qpstat></response>";
    /// let response = ParsedResponse::from_xml(body, None).unwrap();
    ///
    /// assert_eq!(response.amount(), Some(250));
    /// assert_eq!(response.status_message(), Some("Approved"));
    /// assert!(!response.is_valid()); // no secret, no md5check
    /// ```
    pub fn from_xml(body: &str, secret: Option<Secret>) -> Result<Self> {
        let mut elements = read_reply_elements(body)?;

        let mut response = Self::empty(ResponseKind::Api, secret);
        let names = API_RESPONSE_FIELDS.iter().chain(std::iter::once(&MD5CHECK_FIELD));
        for &name in names {
            let value = elements.remove(name).unwrap_or_default();
            if !INTEGER_FIELDS.contains(&name) {
                response.fields.set(name, value);
                continue;
            }
            if value.is_empty() {
                continue;
            }
            let number = value.trim().parse::<i64>().map_err(|e| {
                QuickpayError::protocol(format!("field {} is not an integer: {}", name, e), body)
            })?;
            // Keep the raw text when it is not the canonical rendering; it is what was signed.
            if number.to_string() == value {
                response.fields.set(name, number);
            } else {
                response.fields.set(name, value);
            }
        }

        debug!(
            msgtype = response.fields.get_text("msgtype").unwrap_or_default(),
            qpstat = response.fields.get_text("qpstat").unwrap_or_default(),
            "parsed api reply"
        );
        Ok(response)
    }

    /// Builds a reply from fields posted by the hosted payment window.
    ///
    /// Known fields are taken by name and missing ones stay absent. Fields
    /// named `CUSTOM_<name>` with a non-empty `<name>` are collected into the
    /// custom map under `<name>`. Everything else is dropped. When a name
    /// repeats, the last value wins.
    pub fn from_callback<I, K, V>(pairs: I, secret: Option<Secret>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut response = Self::empty(ResponseKind::Callback, secret);

        for (name, value) in pairs {
            let name = name.as_ref();
            if name == MD5CHECK_FIELD || CALLBACK_RESPONSE_FIELDS.contains(&name) {
                response.fields.set(name, value.into());
            } else if let Some(custom) = name.strip_prefix(CUSTOM_FIELD_PREFIX) {
                if !custom.is_empty() {
                    response.custom.insert(custom.to_string(), value.into());
                }
            }
        }

        debug!(
            fields = response.fields.len(),
            custom = response.custom.len(),
            "parsed callback"
        );
        response
    }

    /// Decodes a raw `application/x-www-form-urlencoded` callback body.
    pub fn from_form_body(body: &str, secret: Option<Secret>) -> Result<Self> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(body).map_err(|e| QuickpayError::protocol(e, body))?;
        Ok(Self::from_callback(pairs, secret))
    }

    /// Which shape this reply has.
    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Checks the reply's `md5check` with the secret it was parsed with, or
    /// the process-wide default secret when it was parsed without one.
    ///
    /// Returns `false` when no secret is known or the reply carries no
    /// checksum. Never fails.
    pub fn is_valid(&self) -> bool {
        let secret = self
            .secret
            .clone()
            .or_else(|| config::defaults().secret)
            .filter(|secret| !secret.is_empty());

        match secret {
            Some(secret) => self.is_valid_with(&secret),
            None => {
                warn!("cannot validate reply without a secret");
                false
            }
        }
    }

    /// Checks the reply's `md5check` with an explicit secret.
    pub fn is_valid_with(&self, secret: &Secret) -> bool {
        let Some(claimed) = self.md5check() else {
            warn!(kind = ?self.kind, "reply carries no md5check");
            return false;
        };

        let valid = checksum::verify(&self.fields, self.kind.canonical_fields(), secret, claimed);
        if !valid {
            warn!(
                kind = ?self.kind,
                ordernumber = self.order_number().unwrap_or_default(),
                "md5check mismatch"
            );
        }
        valid
    }

    /// True when `qpstat` is `000`.
    pub fn is_success(&self) -> bool {
        self.qpstat() == Some("000")
    }

    /// The parsed `qpstat` code, `None` when missing or not in the table.
    pub fn status(&self) -> Option<StatusCode> {
        self.qpstat().and_then(StatusCode::from_code)
    }

    /// Description of `qpstat`. Unknown codes give `None`.
    pub fn status_message(&self) -> Option<&'static str> {
        self.status().map(|status| status.message())
    }

    /// All standard fields.
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// A standard field rendered as text, falling back to custom fields.
    pub fn get_field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(FieldValue::to_string)
            .or_else(|| self.custom.get(name).cloned())
    }

    /// A custom field, looked up without its `CUSTOM_` prefix.
    pub fn custom(&self, name: &str) -> Option<&str> {
        self.custom.get(name).map(String::as_str)
    }

    /// All custom fields, prefix stripped.
    pub fn custom_fields(&self) -> &BTreeMap<String, String> {
        &self.custom
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get_text(name).filter(|s| !s.is_empty())
    }

    fn integer(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_integer)
    }

    /// `msgtype`, when it is one of the known operations.
    pub fn msg_type(&self) -> Option<MessageType> {
        self.text("msgtype").and_then(|s| s.parse().ok())
    }

    /// `ordernumber`
    pub fn order_number(&self) -> Option<&str> {
        self.text("ordernumber")
    }

    /// `amount` in minor units
    pub fn amount(&self) -> Option<i64> {
        self.integer("amount")
    }

    /// `currency`
    pub fn currency(&self) -> Option<&str> {
        self.text("currency")
    }

    /// `time` exactly as sent.
    pub fn time(&self) -> Option<&str> {
        self.text("time")
    }

    /// `time` parsed. Accepts RFC 3339 and the compact `YYMMDDhhmmss`
    /// form, the latter read as UTC.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.time()?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed);
        }
        NaiveDateTime::parse_from_str(raw, "%y%m%d%H%M%S")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
    }

    /// `state`
    pub fn state(&self) -> Option<&str> {
        self.text("state")
    }

    /// `qpstat`
    pub fn qpstat(&self) -> Option<&str> {
        self.text("qpstat")
    }

    /// `qpstatmsg`
    pub fn qpstat_msg(&self) -> Option<&str> {
        self.text("qpstatmsg")
    }

    /// `chstat`, the acquirer's status code
    pub fn chstat(&self) -> Option<&str> {
        self.text("chstat")
    }

    /// `chstatmsg`
    pub fn chstat_msg(&self) -> Option<&str> {
        self.text("chstatmsg")
    }

    /// `merchant`
    pub fn merchant(&self) -> Option<&str> {
        self.text("merchant")
    }

    /// `merchantemail`
    pub fn merchant_email(&self) -> Option<&str> {
        self.text("merchantemail")
    }

    /// `transaction` id
    pub fn transaction(&self) -> Option<i64> {
        self.integer("transaction")
    }

    /// `cardtype`
    pub fn card_type(&self) -> Option<&str> {
        self.text("cardtype")
    }

    /// `cardnumber`, masked by the gateway
    pub fn card_number(&self) -> Option<&str> {
        self.text("cardnumber")
    }

    /// `cardhash`
    pub fn card_hash(&self) -> Option<&str> {
        self.text("cardhash")
    }

    /// `cardexpire`
    pub fn card_expire(&self) -> Option<&str> {
        self.text("cardexpire")
    }

    /// `acquirer`
    pub fn acquirer(&self) -> Option<&str> {
        self.text("acquirer")
    }

    /// `splitpayment`
    pub fn split_payment(&self) -> Option<i64> {
        self.integer("splitpayment")
    }

    /// `fraudprobability`
    pub fn fraud_probability(&self) -> Option<&str> {
        self.text("fraudprobability")
    }

    /// `fraudremarks`
    pub fn fraud_remarks(&self) -> Option<&str> {
        self.text("fraudremarks")
    }

    /// `fraudreport`
    pub fn fraud_report(&self) -> Option<&str> {
        self.text("fraudreport")
    }

    /// `fee`. Only callbacks carry it.
    pub fn fee(&self) -> Option<i64> {
        self.integer("fee")
    }

    /// The checksum sent with the reply.
    pub fn md5check(&self) -> Option<&str> {
        self.text(MD5CHECK_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t";

    fn callback_pairs() -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = [
            ("msgtype", "authorize"),
            ("ordernumber", "ORDER-1001"),
            ("amount", "12500"),
            ("currency", "DKK"),
            ("time", "2013-04-12T15:30:23+02:00"),
            ("state", "1"),
            ("qpstat", "000"),
            ("qpstatmsg", "OK"),
            ("chstat", "000"),
            ("chstatmsg", "OK"),
            ("merchant", "Test shop"),
            ("merchantemail", "shop@example.com"),
            ("transaction", "77001"),
            ("cardtype", "visa"),
            ("cardnumber", "XXXXXXXXXXXX1234"),
            ("cardexpire", "1512"),
            ("splitpayment", "0"),
            ("fee", "0"),
            ("CUSTOM_basket", "42"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let unsigned = ParsedResponse::from_callback(pairs.clone(), None);
        let signature = checksum::sign(
            unsigned.fields(),
            CALLBACK_RESPONSE_FIELDS,
            &Secret::new(SECRET),
        );
        pairs.push(("md5check".to_string(), signature));
        pairs
    }

    #[test]
    fn test_callback_fields_and_custom() {
        let response = ParsedResponse::from_callback(callback_pairs(), Some(Secret::new(SECRET)));

        assert_eq!(response.kind(), ResponseKind::Callback);
        assert_eq!(response.msg_type(), Some(MessageType::Authorize));
        assert_eq!(response.order_number(), Some("ORDER-1001"));
        assert_eq!(response.amount(), Some(12500));
        assert_eq!(response.transaction(), Some(77001));
        assert_eq!(response.fee(), Some(0));
        assert_eq!(response.card_hash(), None);
        assert_eq!(response.custom("basket"), Some("42"));
        assert_eq!(response.get_field("basket").as_deref(), Some("42"));
        assert_eq!(response.get_field("amount").as_deref(), Some("12500"));
        assert!(response.is_valid());
        assert!(response.is_success());
    }

    #[test]
    fn test_tampered_amount_is_rejected() {
        let mut pairs = callback_pairs();
        for (name, value) in pairs.iter_mut() {
            if name == "amount" {
                *value = "1".to_string();
            }
        }
        let response = ParsedResponse::from_callback(pairs, Some(Secret::new(SECRET)));
        assert!(!response.is_valid());
    }

    #[test]
    fn test_custom_fields_are_not_signed() {
        let mut pairs = callback_pairs();
        pairs.push(("CUSTOM_note".to_string(), "changed in transit".to_string()));
        let response = ParsedResponse::from_callback(pairs, Some(Secret::new(SECRET)));

        assert!(response.is_valid());
        assert_eq!(response.custom_fields().len(), 2);
    }

    #[test]
    fn test_empty_custom_name_and_unknown_fields_are_dropped() {
        let response = ParsedResponse::from_callback(
            [("CUSTOM_", "x"), ("foo", "bar"), ("custom_lower", "y")],
            None,
        );
        assert!(response.custom_fields().is_empty());
        assert_eq!(response.get_field("foo"), None);
        assert!(response.fields().is_empty());
    }

    #[test]
    fn test_validation_needs_secret_and_checksum() {
        let pairs = callback_pairs();
        let response = ParsedResponse::from_callback(pairs.clone(), None);
        assert!(!response.is_valid());
        assert!(response.is_valid_with(&Secret::new(SECRET)));
        assert!(!response.is_valid_with(&Secret::new("other")));

        let without_check: Vec<_> = pairs.into_iter().filter(|(k, _)| k != "md5check").collect();
        let response = ParsedResponse::from_callback(without_check, Some(Secret::new(SECRET)));
        assert!(!response.is_valid());
    }

    #[test]
    fn test_fee_only_signed_for_callbacks() {
        // md5("authorize" + "100" + "s3cr3t") vs. the same plus fee "5"
        let mut fields = FieldSet::new();
        fields.set("msgtype", "authorize").set("amount", 100).set("fee", 5);
        let secret = Secret::new(SECRET);
        assert_ne!(
            checksum::sign(&fields, API_RESPONSE_FIELDS, &secret),
            checksum::sign(&fields, CALLBACK_RESPONSE_FIELDS, &secret)
        );
    }

    #[test]
    fn test_form_body_decoding() {
        let body = "msgtype=capture&amount=250&qpstat=009&CUSTOM_ref=a%26b&md5check=abc";
        let response = ParsedResponse::from_form_body(body, None).unwrap();

        assert_eq!(response.msg_type(), Some(MessageType::Capture));
        assert_eq!(response.custom("ref"), Some("a&b"));
        assert_eq!(response.status_message(), Some("Payment aborted by shopper"));
        assert!(!response.is_success());
    }

    #[test]
    fn test_unknown_status_code() {
        let response = ParsedResponse::from_callback([("qpstat", "123")], None);
        assert_eq!(response.status(), None);
        assert_eq!(response.status_message(), None);

        let response = ParsedResponse::from_callback(Vec::<(String, String)>::new(), None);
        assert_eq!(response.status_message(), None);
    }

    #[test]
    fn test_xml_reply() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <msgtype>authorize</msgtype>
  <ordernumber>ORDER-1001</ordernumber>
  <amount>12500</amount>
  <currency>DKK</currency>
  <time>130412153023</time>
  <state>1</state>
  <qpstat>000</qpstat>
  <qpstatmsg>OK</qpstatmsg>
  <transaction>77001</transaction>
  <splitpayment></splitpayment>
  <md5check>ffff</md5check>
</response>"#;
        let response = ParsedResponse::from_xml(body, None).unwrap();

        assert_eq!(response.kind(), ResponseKind::Api);
        assert_eq!(response.amount(), Some(12500));
        assert_eq!(response.transaction(), Some(77001));
        assert_eq!(response.split_payment(), None);
        assert!(!response.fields().contains("splitpayment"));
        assert_eq!(response.fields().get_text("cardtype"), Some(""));
        assert_eq!(response.card_type(), None);
        assert_eq!(response.md5check(), Some("ffff"));
        assert_eq!(
            response.timestamp().unwrap().to_rfc3339(),
            "2013-04-12T15:30:23+00:00"
        );
    }

    #[test]
    fn test_xml_reply_checksum() {
        let mut fields = FieldSet::new();
        fields
            .set("msgtype", "cancel")
            .set("transaction", 5)
            .set("qpstat", "000");
        let signature = checksum::sign(&fields, API_RESPONSE_FIELDS, &Secret::new(SECRET));
        let body = format!(
            "<response><msgtype>cancel</msgtype><qpstat>000</qpstat>\
             <transaction>5</transaction><md5check>{}</md5check></response>",
            signature
        );

        let response = ParsedResponse::from_xml(&body, Some(Secret::new(SECRET))).unwrap();
        assert!(response.is_valid());
    }

    #[test]
    fn test_xml_text_is_kept_verbatim() {
        let mut fields = FieldSet::new();
        fields
            .set("msgtype", "capture")
            .set("qpstat", "000")
            .set("qpstatmsg", " OK ")
            .set("merchant", "Test shop ")
            .set("fraudremarks", "a & <b>");
        let signature = checksum::sign(&fields, API_RESPONSE_FIELDS, &Secret::new(SECRET));
        let body = format!(
            "<response><msgtype>capture</msgtype><qpstat>000</qpstat>\
             <qpstatmsg> OK </qpstatmsg><merchant>Test shop </merchant>\
             <fraudremarks>a &amp; &lt;b&gt;</fraudremarks>\
             <md5check>{}</md5check></response>",
            signature
        );

        let response = ParsedResponse::from_xml(&body, Some(Secret::new(SECRET))).unwrap();
        assert_eq!(response.qpstat_msg(), Some(" OK "));
        assert_eq!(response.merchant(), Some("Test shop "));
        assert_eq!(response.fraud_remarks(), Some("a & <b>"));
        assert!(response.is_valid());
    }

    #[test]
    fn test_xml_integer_keeps_signed_text() {
        let body = "<response><amount>0250</amount><transaction/></response>";
        let response = ParsedResponse::from_xml(body, None).unwrap();

        assert_eq!(response.amount(), Some(250));
        assert_eq!(response.fields().get_text("amount"), Some("0250"));
        assert_eq!(response.transaction(), None);
    }

    #[test]
    fn test_incomplete_xml_is_protocol_error() {
        for body in ["", "not xml", "<response><amount>12</amount>"] {
            let err = ParsedResponse::from_xml(body, None).unwrap_err();
            assert!(matches!(err, QuickpayError::ProtocolError { .. }), "{body:?}");
        }
    }

    #[test]
    fn test_malformed_xml_is_protocol_error() {
        let err =
            ParsedResponse::from_xml("<response><amount>12</qpstat></response>", None).unwrap_err();
        assert!(matches!(err, QuickpayError::ProtocolError { .. }));

        let err = ParsedResponse::from_xml("<response><amount>twelve</amount></response>", None)
            .unwrap_err();
        match err {
            QuickpayError::ProtocolError { message, body } => {
                assert!(message.contains("amount"));
                assert!(body.contains("twelve"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rfc3339_timestamp() {
        let response = ParsedResponse::from_callback([("time", "2013-04-12T15:30:23+02:00")], None);
        assert_eq!(
            response.timestamp().unwrap().to_rfc3339(),
            "2013-04-12T15:30:23+02:00"
        );
        let response = ParsedResponse::from_callback([("time", "yesterday")], None);
        assert_eq!(response.timestamp(), None);
    }

    #[test]
    fn test_serialize_skips_secret() {
        let response = ParsedResponse::from_callback(callback_pairs(), Some(Secret::new(SECRET)));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["kind"], "callback");
        assert_eq!(json["fields"]["amount"], 12500);
        assert_eq!(json["fields"]["fee"], 0);
        assert_eq!(json["fields"]["currency"], "DKK");
        assert_eq!(json["custom"]["basket"], "42");
        assert!(!json.to_string().contains(SECRET));
    }
}

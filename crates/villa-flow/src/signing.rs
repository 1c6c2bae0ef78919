//! Signed, expiring action links for owner approve/decline decisions.
//!
//! The links land in an email and are opened as unauthenticated GETs, so the
//! query string itself is the credential: an HMAC-SHA256 over a canonical
//! ordering of the parameters, plus an expiry that is checked on its own
//! before any signature comparison. Verification never reveals which check
//! failed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::SigningConfig;

type HmacSha256 = Hmac<Sha256>;

pub const ACTION_APPROVE: &str = "approve";
pub const ACTION_DECLINE: &str = "decline";

/// Verified parameters carried by a signed action link.
///
/// Decline deliberately carries no price or currency: declining commits the
/// owner to nothing financial, so nothing financial is signed.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionParams {
    Approve {
        inquiry_id: String,
        price: f64,
        currency: String,
        expires_at: i64,
    },
    Decline {
        inquiry_id: String,
        expires_at: i64,
    },
}

impl ActionParams {
    pub fn inquiry_id(&self) -> &str {
        match self {
            ActionParams::Approve { inquiry_id, .. } => inquiry_id,
            ActionParams::Decline { inquiry_id, .. } => inquiry_id,
        }
    }

    pub fn expires_at(&self) -> i64 {
        match self {
            ActionParams::Approve { expires_at, .. } => *expires_at,
            ActionParams::Decline { expires_at, .. } => *expires_at,
        }
    }

    /// Canonical signing payload: ordered field values joined with `:`.
    fn canonical_payload(&self) -> String {
        match self {
            ActionParams::Approve {
                inquiry_id,
                price,
                currency,
                expires_at,
            } => format!(
                "{inquiry_id}:{ACTION_APPROVE}:{}:{currency}:{expires_at}",
                format_amount(*price)
            ),
            ActionParams::Decline {
                inquiry_id,
                expires_at,
            } => format!("{inquiry_id}:{ACTION_DECLINE}:{expires_at}"),
        }
    }
}

/// `true` once the link's expiry timestamp (Unix millis) is no longer in the future.
pub fn is_expired(expires_at: i64, now_millis: i64) -> bool {
    expires_at <= now_millis
}

/// Canonical rendering of a price for signing and URLs: whole amounts stay
/// whole (`5850`), fractional amounts get two decimals (`999.99`).
pub fn format_amount(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

#[derive(Serialize)]
struct ApproveQuery<'a> {
    #[serde(rename = "inquiryId")]
    inquiry_id: &'a str,
    action: &'a str,
    price: String,
    currency: &'a str,
    expires: i64,
    sig: String,
}

#[derive(Serialize)]
struct DeclineQuery<'a> {
    #[serde(rename = "inquiryId")]
    inquiry_id: &'a str,
    action: &'a str,
    expires: i64,
    sig: String,
}

#[derive(Deserialize)]
struct RawActionQuery {
    #[serde(rename = "inquiryId")]
    inquiry_id: Option<String>,
    action: Option<String>,
    price: Option<String>,
    currency: Option<String>,
    expires: Option<String>,
    sig: Option<String>,
}

/// Signs and verifies owner-action links with a server-held secret.
pub struct LinkSigner {
    secret: Vec<u8>,
    link_ttl_hours: u64,
}

impl LinkSigner {
    /// The configuration layer guarantees a non-empty secret before this runs.
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            secret: config.secret.as_bytes().to_vec(),
            link_ttl_hours: config.link_ttl_hours,
        }
    }

    fn mac_hex(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn sign(&self, params: &ActionParams) -> String {
        self.mac_hex(&params.canonical_payload())
    }

    /// Constant-time signature check; expiry is *not* part of this.
    pub fn verify(&self, params: &ActionParams, signature: &str) -> bool {
        self.verify_payload(&params.canonical_payload(), signature)
    }

    fn verify_payload(&self, payload: &str, signature: &str) -> bool {
        let expected = self.mac_hex(payload);
        // Length is not secret; the content comparison is constant time.
        if expected.len() != signature.len() {
            return false;
        }
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }

    fn expires_at(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() + (self.link_ttl_hours as i64) * 60 * 60 * 1000
    }

    /// Build a signed approval URL carrying the proposed price.
    pub fn approve_url(
        &self,
        action_endpoint: &str,
        inquiry_id: &str,
        price: f64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> String {
        let expires = self.expires_at(now);
        let params = ActionParams::Approve {
            inquiry_id: inquiry_id.to_string(),
            price,
            currency: currency.to_string(),
            expires_at: expires,
        };
        let query = ApproveQuery {
            inquiry_id,
            action: ACTION_APPROVE,
            price: format_amount(price),
            currency,
            expires,
            sig: self.sign(&params),
        };
        let encoded = serde_urlencoded::to_string(&query).unwrap_or_default();
        format!("{action_endpoint}?{encoded}")
    }

    /// Build a signed decline URL.
    pub fn decline_url(&self, action_endpoint: &str, inquiry_id: &str, now: DateTime<Utc>) -> String {
        let expires = self.expires_at(now);
        let params = ActionParams::Decline {
            inquiry_id: inquiry_id.to_string(),
            expires_at: expires,
        };
        let query = DeclineQuery {
            inquiry_id,
            action: ACTION_DECLINE,
            expires,
            sig: self.sign(&params),
        };
        let encoded = serde_urlencoded::to_string(&query).unwrap_or_default();
        format!("{action_endpoint}?{encoded}")
    }

    /// Parse a raw query string and return the verified action, or `None`.
    ///
    /// Rejection order: missing parameters, unparseable action kind, expiry,
    /// then signature. An expired-but-correctly-signed link never verifies.
    /// The signature payload is rebuilt from the *raw* query values so a
    /// float round-trip can never change what gets MACed.
    pub fn parse_and_verify(&self, query: &str, now_millis: i64) -> Option<ActionParams> {
        let raw: RawActionQuery = serde_urlencoded::from_str(query).ok()?;
        let inquiry_id = non_empty(raw.inquiry_id)?;
        let action = non_empty(raw.action)?;
        let expires_raw = non_empty(raw.expires)?;
        let sig = non_empty(raw.sig)?;
        let expires: i64 = expires_raw.parse().ok()?;

        if is_expired(expires, now_millis) {
            return None;
        }

        match action.as_str() {
            ACTION_APPROVE => {
                let price_raw = non_empty(raw.price)?;
                let currency = non_empty(raw.currency)?;
                let price: f64 = price_raw.parse().ok()?;
                if !price.is_finite() || price <= 0.0 {
                    return None;
                }
                let payload =
                    format!("{inquiry_id}:{ACTION_APPROVE}:{price_raw}:{currency}:{expires_raw}");
                if !self.verify_payload(&payload, &sig) {
                    return None;
                }
                Some(ActionParams::Approve {
                    inquiry_id,
                    price,
                    currency,
                    expires_at: expires,
                })
            }
            ACTION_DECLINE => {
                let payload = format!("{inquiry_id}:{ACTION_DECLINE}:{expires_raw}");
                if !self.verify_payload(&payload, &sig) {
                    return None;
                }
                Some(ActionParams::Decline {
                    inquiry_id,
                    expires_at: expires,
                })
            }
            _ => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> LinkSigner {
        LinkSigner::new(&SigningConfig {
            secret: "unit-test-secret".to_string(),
            link_ttl_hours: 72,
        })
    }

    fn query_of(url: &str) -> &str {
        url.split_once('?').expect("url has query").1
    }

    #[test]
    fn approve_link_round_trips() {
        let signer = signer();
        let now = Utc::now();
        let url = signer.approve_url("https://site.example/api/owner-action", "inq-42", 5850.0, "EUR", now);
        let parsed = signer
            .parse_and_verify(query_of(&url), now.timestamp_millis())
            .expect("freshly minted link verifies");
        match parsed {
            ActionParams::Approve {
                inquiry_id,
                price,
                currency,
                ..
            } => {
                assert_eq!(inquiry_id, "inq-42");
                assert_eq!(price, 5850.0);
                assert_eq!(currency, "EUR");
            }
            other => panic!("expected approve action, got {other:?}"),
        }
    }

    #[test]
    fn decline_payload_omits_price_and_currency() {
        let params = ActionParams::Decline {
            inquiry_id: "inq-7".to_string(),
            expires_at: 1_700_000_000_000,
        };
        assert_eq!(params.canonical_payload(), "inq-7:decline:1700000000000");
    }

    #[test]
    fn flipping_any_character_breaks_verification() {
        let signer = signer();
        let now = Utc::now();
        let url = signer.approve_url("https://x/api/owner-action", "inq-42", 999.99, "EUR", now);
        let query = query_of(&url).to_string();

        // Tamper each signed field in place: price digit, currency letter,
        // expires digit, inquiry id.
        for (from, to) in [
            ("price=999.99", "price=998.99"),
            ("currency=EUR", "currency=EUS"),
            ("inquiryId=inq-42", "inquiryId=inq-43"),
        ] {
            let tampered = query.replace(from, to);
            assert_ne!(tampered, query, "tamper target {from} must exist");
            assert!(
                signer.parse_and_verify(&tampered, now.timestamp_millis()).is_none(),
                "tampered {from} must not verify"
            );
        }

        // Expires tamper: bump the last digit without expiring the link.
        let expires = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("expires="))
            .expect("expires present");
        let bumped: i64 = expires.parse::<i64>().expect("expires is numeric") + 1;
        let tampered = query.replace(
            &format!("expires={expires}"),
            &format!("expires={bumped}"),
        );
        assert!(signer
            .parse_and_verify(&tampered, now.timestamp_millis())
            .is_none());
    }

    #[test]
    fn expired_link_rejected_despite_valid_signature() {
        let signer = signer();
        let expires_at = Utc::now().timestamp_millis() - 1;
        let params = ActionParams::Decline {
            inquiry_id: "inq-9".to_string(),
            expires_at,
        };
        let sig = signer.sign(&params);
        assert!(signer.verify(&params, &sig), "signature itself is valid");

        let query = format!("inquiryId=inq-9&action=decline&expires={expires_at}&sig={sig}");
        assert!(signer
            .parse_and_verify(&query, Utc::now().timestamp_millis())
            .is_none());
    }

    #[test]
    fn missing_params_and_unknown_actions_are_rejected() {
        let signer = signer();
        let now = Utc::now().timestamp_millis();
        assert!(signer.parse_and_verify("", now).is_none());
        assert!(signer
            .parse_and_verify("inquiryId=a&action=approve&expires=9999999999999", now)
            .is_none());
        assert!(signer
            .parse_and_verify("inquiryId=a&action=archive&expires=9999999999999&sig=ab", now)
            .is_none());
    }

    #[test]
    fn amount_formatting_is_canonical() {
        assert_eq!(format_amount(5850.0), "5850");
        assert_eq!(format_amount(999.99), "999.99");
        assert_eq!(format_amount(0.01), "0.01");
    }
}

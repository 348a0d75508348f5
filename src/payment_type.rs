//! Payment types known to the gateway.
//!
//! A [`PaymentType`] decides which upstream service handles a request. Two static tables
//! identify the type of a request:
//!
//! - **Credit destination tokens**: the `credit_dst_type` value carried in request content,
//!   used when a request is classified from its own body.
//! - **Provider codes**: the `credit_provider` value reported by the payments service,
//!   used when a request is classified by a remote lookup.
//!
//! The declaration order of [`PaymentType::ALL`] is the route-matching priority.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A payment product category. Each category is served by its own upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentType {
    /// Card-to-card transfers.
    #[serde(rename = "P2P")]
    P2p,
    /// Transfers to a mobile number.
    #[serde(rename = "P2M")]
    P2m,
    /// Transfers to a bank account.
    #[serde(rename = "IBAN")]
    Iban,
    /// Card tokenization. Requests carry no destination type at all.
    #[serde(rename = "TOKENIZATION")]
    Tokenization,
}

/// Upstream provider codes and the payment type each one belongs to.
///
/// Several codes alias the same type (`TRANZZO` and `TRANZZO_P2P` both mean P2P).
/// Codes are matched case-insensitively.
const PROVIDER_CODES: &[(&str, PaymentType)] = &[
    ("UAPI", PaymentType::P2p),
    ("TRANZZO", PaymentType::P2p),
    ("TRANZZO_P2P", PaymentType::P2p),
    ("P2M_PROVIDER", PaymentType::P2m),
    ("MOBILE", PaymentType::P2m),
    ("IBAN", PaymentType::Iban),
    ("TRANZZO_TOKENIZATION", PaymentType::Tokenization),
];

impl PaymentType {
    /// Every payment type, in route-matching priority order.
    pub const ALL: [PaymentType; 4] = [
        PaymentType::P2p,
        PaymentType::P2m,
        PaymentType::Iban,
        PaymentType::Tokenization,
    ];

    /// Iterates over all payment types in priority order.
    pub fn all() -> impl Iterator<Item = PaymentType> {
        Self::ALL.into_iter()
    }

    /// Canonical name, as written into responses and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::P2p => "P2P",
            PaymentType::P2m => "P2M",
            PaymentType::Iban => "IBAN",
            PaymentType::Tokenization => "TOKENIZATION",
        }
    }

    /// Credit destination tokens that identify this type.
    ///
    /// `None` stands for a request that carries no destination type.
    pub fn destination_tokens(&self) -> &'static [Option<&'static str>] {
        match self {
            PaymentType::P2p => &[
                Some("pan"),
                Some("panId"),
                Some("external_card_id"),
                Some("card_token"),
            ],
            PaymentType::P2m => &[Some("mobile")],
            PaymentType::Iban => &[Some("iban")],
            PaymentType::Tokenization => &[None],
        }
    }

    /// Whether a request with the given destination token belongs to this type.
    pub fn accepts_destination(&self, token: Option<&str>) -> bool {
        self.destination_tokens().contains(&token)
    }

    /// Maps a provider code reported by the payments service to a payment type.
    ///
    /// Returns `None` for codes the gateway does not know.
    pub fn from_provider_code(code: &str) -> Option<PaymentType> {
        PROVIDER_CODES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(code))
            .map(|(_, payment_type)| *payment_type)
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

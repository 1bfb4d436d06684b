//! Type definitions for the Paygate SDK

use serde::{Deserialize, Serialize};

use crate::error::{PaygateError, Result};

/// Gateway mode selected at initialization.
///
/// Test public keys are only accepted in test mode; the gateway rejects
/// mismatched key/mode pairs with an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No money moves; test cards and test keys only.
    Test,
    /// Production processing.
    Live,
}

impl Mode {
    pub fn is_test(self) -> bool {
        self == Mode::Test
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// A payment instrument to be tokenized.
///
/// Card numbers, CVCs and IBANs never appear in `Debug` output; only enough
/// digits survive to identify the instrument in logs.
#[derive(Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    Card {
        number: String,
        expiry_month: u8,
        expiry_year: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        holder: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cvc: Option<String>,
    },
    SepaDebit {
        iban: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        bic: Option<String>,
        holder: String,
    },
}

impl PaymentMethod {
    /// Build a card method. Spaces and dashes in the number are stripped.
    pub fn card(
        number: &str,
        expiry_month: u8,
        expiry_year: u16,
        holder: Option<&str>,
        cvc: Option<&str>,
    ) -> Self {
        let number: String = number.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
        Self::Card {
            number,
            expiry_month,
            expiry_year,
            holder: holder.map(str::to_string),
            cvc: cvc.map(str::to_string),
        }
    }

    /// Build a SEPA direct debit method. The IBAN is uppercased and spaces
    /// are stripped.
    pub fn sepa_debit(iban: &str, bic: Option<&str>, holder: &str) -> Self {
        let iban: String = iban
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        Self::SepaDebit {
            iban,
            bic: bic.map(str::to_string),
            holder: holder.to_string(),
        }
    }

    /// Check the instrument's shape without contacting the gateway.
    ///
    /// This is the same check the SDK runs before every tokenization, so a
    /// UI can pre-flight form input with it.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Card {
                number,
                expiry_month,
                expiry_year,
                cvc,
                ..
            } => {
                if number.len() < 12
                    || number.len() > 19
                    || !number.bytes().all(|b| b.is_ascii_digit())
                {
                    return Err(PaygateError::validation(
                        "Card number must be 12-19 digits",
                    ));
                }
                if !luhn_valid(number) {
                    return Err(PaygateError::validation("Card number failed checksum"));
                }
                if !(1..=12).contains(expiry_month) {
                    return Err(PaygateError::validation("Expiry month must be 1-12"));
                }
                if !(2000..=2099).contains(expiry_year) {
                    return Err(PaygateError::validation(
                        "Expiry year must be a four digit year",
                    ));
                }
                if let Some(cvc) = cvc {
                    if !(cvc.len() == 3 || cvc.len() == 4)
                        || !cvc.bytes().all(|b| b.is_ascii_digit())
                    {
                        return Err(PaygateError::validation("CVC must be 3 or 4 digits"));
                    }
                }
                Ok(())
            }
            Self::SepaDebit { iban, bic, holder } => {
                if iban.len() < 15 || iban.len() > 34 {
                    return Err(PaygateError::validation("IBAN must be 15-34 characters"));
                }
                let bytes = iban.as_bytes();
                if !bytes[..2].iter().all(u8::is_ascii_uppercase)
                    || !bytes[2..].iter().all(u8::is_ascii_alphanumeric)
                {
                    return Err(PaygateError::validation(
                        "IBAN must start with a country code followed by alphanumerics",
                    ));
                }
                if let Some(bic) = bic {
                    if !(bic.len() == 8 || bic.len() == 11)
                        || !bic.bytes().all(|b| b.is_ascii_alphanumeric())
                    {
                        return Err(PaygateError::validation("BIC must be 8 or 11 characters"));
                    }
                }
                if holder.trim().is_empty() {
                    return Err(PaygateError::validation("Account holder is required"));
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Card {
                number,
                expiry_month,
                expiry_year,
                holder,
                ..
            } => f
                .debug_struct("Card")
                .field("number", &mask_tail(number))
                .field("expiry_month", expiry_month)
                .field("expiry_year", expiry_year)
                .field("holder", holder)
                .field("cvc", &"<redacted>")
                .finish(),
            Self::SepaDebit { iban, bic, holder } => f
                .debug_struct("SepaDebit")
                .field("iban", &mask_tail(iban))
                .field("bic", bic)
                .field("holder", holder)
                .finish(),
        }
    }
}

/// Keep only the last four characters, e.g. `"************4242"`.
fn mask_tail(s: &str) -> String {
    let keep = s.chars().count().saturating_sub(4);
    let mut out = "*".repeat(keep);
    out.extend(s.chars().skip(keep));
    out
}

/// Luhn checksum over an ASCII digit string.
fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        let mut d = (b - b'0') as u32;
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Charge configuration: how much, in what currency, and an optional
/// soft descriptor that ends up on the customer's statement.
#[derive(Debug, Clone)]
pub struct PaymentParams {
    /// Amount in the currency's minor unit (cents for EUR/USD).
    pub amount: i64,
    /// ISO 4217 code, e.g. "EUR".
    pub currency: String,
    pub description: Option<String>,
}

impl PaymentParams {
    pub fn new(amount: i64, currency: &str) -> Self {
        Self {
            amount,
            currency: currency.to_uppercase(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(PaygateError::validation("Amount must be positive"));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(PaygateError::validation(
                "Currency must be a three letter ISO 4217 code",
            ));
        }
        Ok(())
    }
}

/// Lifecycle state reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Open,
    Pending,
    Closed,
    Failed,
}

/// A charge record.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Gateway id, `txn_` + 32 hex chars.
    pub id: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub status: EntityStatus,
    /// Whether this transaction was created for later consumption.
    pub consumable: bool,
    /// Consumption is monotonic; once true this never flips back.
    pub consumed: bool,
    /// Unix timestamp assigned by the gateway.
    pub created_at: i64,
}

/// A funds reservation, consumable into a charge later.
#[derive(Debug, Clone, Deserialize)]
pub struct Preauthorization {
    /// Gateway id, `pre_` + 32 hex chars.
    pub id: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub status: EntityStatus,
    pub consumable: bool,
    pub consumed: bool,
    pub created_at: i64,
}

/// Result of a successful initialization.
#[derive(Debug, Clone)]
pub struct InitDetails {
    /// The device id now associated with this installation.
    pub device_id: String,
    pub mode: Mode,
}

/// Result of [`initialize_and_fetch`](crate::Paygate::initialize_and_fetch):
/// initialization details plus the not-yet-consumed entities for this device.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub device_id: String,
    pub mode: Mode,
    pub not_consumed_transactions: Vec<Transaction>,
    pub not_consumed_preauthorizations: Vec<Preauthorization>,
}

/// Device ids are issued by the gateway as `dev_` + 32 hex chars. Arbitrary
/// caller-supplied strings are rejected before they reach the network.
pub(crate) fn is_valid_device_id(s: &str) -> bool {
    let Some(hex) = s.strip_prefix("dev_") else {
        return false;
    };
    hex.len() == 32 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

// Wire envelopes. Entities deserialize directly; these cover the rest.

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceResponse {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsumeResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResponse<T> {
    pub data: Vec<T>,
}

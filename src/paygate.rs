//! Paygate client: tokenization, transactions, preauthorizations and
//! device management against the remote gateway.

use std::sync::{Arc, OnceLock};

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{map_status_to_error_code, PaygateError, PaygateErrorCode, Result};
use crate::storage::{keys, MemoryStorage, StorageAdapter};
use crate::types::{
    is_valid_device_id, ConsumeResponse, DeviceResponse, InitDetails, InitOutcome, ListResponse,
    Mode, PaymentMethod, PaymentParams, Preauthorization, TokenResponse, Transaction,
};

/// Default Paygate API URL
pub const DEFAULT_BASE_URL: &str = "https://api.paygate.dev";

/// Configuration options for the Paygate client
#[derive(Clone, Default)]
pub struct PaygateOptions {
    /// Gateway URL (default: "https://api.paygate.dev")
    pub base_url: Option<String>,
    /// Custom storage adapter for the device id (default: MemoryStorage)
    pub storage: Option<Arc<dyn StorageAdapter>>,
    /// Prebuilt HTTP client, e.g. with a proxy configured
    pub http: Option<HttpClient>,
}

impl std::fmt::Debug for PaygateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaygateOptions")
            .field("base_url", &self.base_url)
            .field("storage", &"<storage>")
            .field("http", &self.http.is_some())
            .finish()
    }
}

/// Merchant credentials, set exactly once per client by `initialize`.
struct Session {
    mode: Mode,
    public_key: String,
}

/// Paygate SDK client.
///
/// Construction is cheap and local. The first asynchronous call must be
/// [`initialize`](Self::initialize) (or
/// [`initialize_and_fetch`](Self::initialize_and_fetch)); every other
/// operation fails with [`PaygateErrorCode::NotInitialized`] until then.
/// Clients are independent of each other, so tests can run several against
/// different gateways side by side.
///
/// # Example
/// ```rust,ignore
/// use paygate_sdk::{Mode, Paygate, PaymentMethod, PaymentParams};
///
/// let client = Paygate::new(Default::default())?;
/// client.initialize(Mode::Test, "tpk_test_1", None).await?;
///
/// let card = PaymentMethod::card("4242424242424242", 12, 2030, None, Some("123"));
/// let params = PaymentParams::new(4200, "EUR").with_description("Order 17");
/// let tx = client.transaction_with_method(&card, &params, false).await?;
/// println!("charged: {}", tx.id);
/// ```
pub struct Paygate {
    http: HttpClient,
    base_url: String,
    storage: Arc<dyn StorageAdapter>,
    session: OnceLock<Session>,
}

impl Paygate {
    /// Create a new client. No network traffic happens here.
    pub fn new(options: PaygateOptions) -> Result<Self> {
        let base_url = options
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&base_url).map_err(|_| PaygateError::validation("Invalid base URL"))?;

        let storage: Arc<dyn StorageAdapter> = options
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        let http = match options.http {
            Some(http) => http,
            None => HttpClient::builder()
                .user_agent(concat!("paygate-sdk-rust/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| PaygateError::network(e.to_string()))?,
        };

        Ok(Self {
            http,
            base_url,
            storage,
            session: OnceLock::new(),
        })
    }

    // ==================== Initialization ====================

    /// Initialize the client. This must be the first asynchronous call.
    ///
    /// # Arguments
    /// * `mode` - test or live processing
    /// * `public_key` - your merchant public key for the chosen mode
    /// * `device_id` - an optional device id. This cannot be an arbitrary
    ///   string; it must have been issued by the gateway earlier (for
    ///   example through [`new_device_id`](Self::new_device_id) on another
    ///   install), which lets you associate your own users with device ids.
    ///   When omitted, a previously persisted id is reused, and a fresh one
    ///   is requested from the gateway if none exists yet.
    ///
    /// Initializing twice is a caller error and fails with a validation
    /// error; the first session stays in place.
    pub async fn initialize(
        &self,
        mode: Mode,
        public_key: &str,
        device_id: Option<&str>,
    ) -> Result<InitDetails> {
        if self.session.get().is_some() {
            return Err(PaygateError::validation("Client is already initialized"));
        }
        if public_key.is_empty() {
            return Err(PaygateError::validation("public_key is required"));
        }

        let device_id = match device_id {
            Some(id) => {
                if !is_valid_device_id(id) {
                    return Err(PaygateError::validation(
                        "Device id was not issued by the gateway",
                    ));
                }
                self.storage.set(keys::DEVICE_ID, id);
                id.to_string()
            }
            None => match self.storage.get(keys::DEVICE_ID) {
                Some(id) => id,
                None => self.request_device_id(public_key).await?,
            },
        };

        if self
            .session
            .set(Session {
                mode,
                public_key: public_key.to_string(),
            })
            .is_err()
        {
            return Err(PaygateError::validation("Client is already initialized"));
        }

        tracing::debug!(%mode, %device_id, "paygate client initialized");
        Ok(InitDetails { device_id, mode })
    }

    /// Initialize and fetch the not-consumed transactions and
    /// preauthorizations for this device in one go.
    ///
    /// Convenient on app startup for merchants that finalize reserved
    /// charges client-side.
    pub async fn initialize_and_fetch(
        &self,
        mode: Mode,
        public_key: &str,
        device_id: Option<&str>,
    ) -> Result<InitOutcome> {
        let details = self.initialize(mode, public_key, device_id).await?;

        let not_consumed_transactions = self.not_consumed_transactions().await?;
        let not_consumed_preauthorizations = self.not_consumed_preauthorizations().await?;

        Ok(InitOutcome {
            device_id: details.device_id,
            mode: details.mode,
            not_consumed_transactions,
            not_consumed_preauthorizations,
        })
    }

    // ==================== Tokenization ====================

    /// Tokenize a payment method with the session's key and mode.
    ///
    /// The returned token is short-lived and accepted by the gateway at
    /// most once, by either a transaction or a preauthorization creation.
    /// Tokenization itself creates no ledger entity. The method (and the
    /// params, when given) are validated locally first; nothing is sent on
    /// validation failure.
    pub async fn generate_token(
        &self,
        method: &PaymentMethod,
        params: Option<&PaymentParams>,
    ) -> Result<String> {
        let session = self.session()?;
        self.request_token(&session.public_key, session.mode, method, params)
            .await
    }

    /// Tokenize with an explicit key/mode instead of the session's.
    ///
    /// This is the preferred way to hand tokens to your own backend: the
    /// token can be created against the key your server charges with, while
    /// the client stays initialized with another.
    pub async fn generate_token_with_key(
        &self,
        public_key: &str,
        mode: Mode,
        method: &PaymentMethod,
        params: Option<&PaymentParams>,
    ) -> Result<String> {
        self.session()?;
        if public_key.is_empty() {
            return Err(PaygateError::validation("public_key is required"));
        }
        self.request_token(public_key, mode, method, params).await
    }

    // ==================== Transactions ====================

    /// Create a transaction from a payment method.
    ///
    /// Convenience composite: generates a token in the background, then
    /// charges it. If tokenization fails, the charge is never attempted and
    /// the single error describes what went wrong.
    pub async fn transaction_with_method(
        &self,
        method: &PaymentMethod,
        params: &PaymentParams,
        consumable: bool,
    ) -> Result<Transaction> {
        let token = self.generate_token(method, Some(params)).await?;
        self.transaction_with_token(&token, params, consumable).await
    }

    /// Create a transaction from a previously generated token.
    pub async fn transaction_with_token(
        &self,
        token: &str,
        params: &PaymentParams,
        consumable: bool,
    ) -> Result<Transaction> {
        self.create_entity("/transactions", token, params, consumable)
            .await
    }

    /// List all transactions for the configured device id, oldest first.
    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        self.list("/transactions", false).await
    }

    /// List the transactions that have not been consumed yet.
    pub async fn not_consumed_transactions(&self) -> Result<Vec<Transaction>> {
        self.list("/transactions", true).await
    }

    /// Fetch a single transaction by id.
    pub async fn transaction(&self, id: &str) -> Result<Transaction> {
        self.fetch_entity("/transactions", id).await
    }

    /// Consume the given transaction. After successful consumption it no
    /// longer appears in the not-consumed listing. Consumption is
    /// idempotent at the gateway; the consumed id is returned either way.
    pub async fn consume_transaction(&self, id: &str) -> Result<String> {
        self.consume("/transactions", id).await
    }

    // ==================== Preauthorizations ====================

    /// Reserve funds from a payment method.
    ///
    /// Convenience composite like
    /// [`transaction_with_method`](Self::transaction_with_method): a token
    /// generation failure short-circuits the reservation.
    pub async fn preauthorization_with_method(
        &self,
        method: &PaymentMethod,
        params: &PaymentParams,
        consumable: bool,
    ) -> Result<Preauthorization> {
        let token = self.generate_token(method, Some(params)).await?;
        self.preauthorization_with_token(&token, params, consumable)
            .await
    }

    /// Reserve funds using a previously generated token.
    pub async fn preauthorization_with_token(
        &self,
        token: &str,
        params: &PaymentParams,
        consumable: bool,
    ) -> Result<Preauthorization> {
        self.create_entity("/preauthorizations", token, params, consumable)
            .await
    }

    /// List all preauthorizations for the configured device id, oldest
    /// first.
    pub async fn preauthorizations(&self) -> Result<Vec<Preauthorization>> {
        self.list("/preauthorizations", false).await
    }

    /// List the preauthorizations that have not been consumed yet.
    pub async fn not_consumed_preauthorizations(&self) -> Result<Vec<Preauthorization>> {
        self.list("/preauthorizations", true).await
    }

    /// Fetch a single preauthorization by id.
    pub async fn preauthorization(&self, id: &str) -> Result<Preauthorization> {
        self.fetch_entity("/preauthorizations", id).await
    }

    /// Consume the given preauthorization, finalizing the reserved charge.
    pub async fn consume_preauthorization(&self, id: &str) -> Result<String> {
        self.consume("/preauthorizations", id).await
    }

    // ==================== Device Management ====================

    /// Request a fresh device id from the gateway.
    ///
    /// The new id is persisted and replaces the current one, so subsequent
    /// listings are scoped to it.
    pub async fn new_device_id(&self) -> Result<String> {
        let session = self.session()?;
        self.request_device_id(&session.public_key).await
    }

    /// The persisted device id, or `None` if none was generated or supplied
    /// yet. Local and synchronous; callable before initialization.
    pub fn device_id(&self) -> Option<String> {
        self.storage.get(keys::DEVICE_ID)
    }

    // ==================== Queries ====================

    /// Whether `initialize` has completed on this client.
    pub fn is_initialized(&self) -> bool {
        self.session.get().is_some()
    }

    /// The mode the client was initialized with.
    pub fn mode(&self) -> Option<Mode> {
        self.session.get().map(|s| s.mode)
    }

    /// The SDK version string.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    // ==================== Internal Helpers ====================

    fn session(&self) -> Result<&Session> {
        self.session.get().ok_or_else(PaygateError::not_initialized)
    }

    fn require_device_id(&self) -> Result<String> {
        self.storage
            .get(keys::DEVICE_ID)
            .ok_or_else(|| PaygateError::validation("No device id available"))
    }

    async fn request_token(
        &self,
        public_key: &str,
        mode: Mode,
        method: &PaymentMethod,
        params: Option<&PaymentParams>,
    ) -> Result<String> {
        method.validate()?;
        if let Some(params) = params {
            params.validate()?;
        }
        let device_id = self.require_device_id()?;

        #[derive(Serialize)]
        struct TokenRequest<'a> {
            public_key: &'a str,
            test: bool,
            device_id: String,
            method: &'a PaymentMethod,
            #[serde(skip_serializing_if = "Option::is_none")]
            amount: Option<i64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            currency: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
        }

        let body = TokenRequest {
            public_key,
            test: mode.is_test(),
            device_id,
            method,
            amount: params.map(|p| p.amount),
            currency: params.map(|p| p.currency.as_str()),
            description: params.and_then(|p| p.description.as_deref()),
        };

        let response: TokenResponse = self.post("/tokens", &body).await?;
        Ok(response.token)
    }

    async fn create_entity<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        token: &str,
        params: &PaymentParams,
        consumable: bool,
    ) -> Result<T> {
        let session = self.session()?;
        if token.is_empty() {
            return Err(PaygateError::validation("Token is required"));
        }
        params.validate()?;
        let device_id = self.require_device_id()?;

        #[derive(Serialize)]
        struct CreateRequest<'a> {
            public_key: &'a str,
            device_id: String,
            token: &'a str,
            amount: i64,
            currency: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            description: Option<&'a str>,
            consumable: bool,
        }

        let body = CreateRequest {
            public_key: &session.public_key,
            device_id,
            token,
            amount: params.amount,
            currency: &params.currency,
            description: params.description.as_deref(),
            consumable,
        };

        self.post(path, &body).await
    }

    async fn list<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        not_consumed_only: bool,
    ) -> Result<Vec<T>> {
        let url = self.scoped_url(path, not_consumed_only)?;
        let response: ListResponse<T> = self.get(&url).await?;
        Ok(response.data)
    }

    async fn fetch_entity<T: for<'de> Deserialize<'de>>(&self, path: &str, id: &str) -> Result<T> {
        if id.is_empty() {
            return Err(PaygateError::validation("Id is required"));
        }
        let url = self.scoped_url(&format!("{path}/{}", urlencoding::encode(id)), false)?;
        self.get(&url).await
    }

    async fn consume(&self, path: &str, id: &str) -> Result<String> {
        let session = self.session()?;
        if id.is_empty() {
            return Err(PaygateError::validation("Id is required"));
        }
        let device_id = self.require_device_id()?;

        #[derive(Serialize)]
        struct ConsumeRequest<'a> {
            public_key: &'a str,
            device_id: String,
        }

        let body = ConsumeRequest {
            public_key: &session.public_key,
            device_id,
        };

        let response: ConsumeResponse = self
            .post(
                &format!("{path}/{}/consume", urlencoding::encode(id)),
                &body,
            )
            .await?;
        Ok(response.id)
    }

    async fn request_device_id(&self, public_key: &str) -> Result<String> {
        #[derive(Serialize)]
        struct DeviceRequest<'a> {
            public_key: &'a str,
        }

        let response: DeviceResponse = self.post("/devices", &DeviceRequest { public_key }).await?;

        if !is_valid_device_id(&response.device_id) {
            return Err(PaygateError::new(
                PaygateErrorCode::GatewayError,
                "Gateway returned a malformed device id",
            ));
        }

        self.storage.set(keys::DEVICE_ID, &response.device_id);
        Ok(response.device_id)
    }

    /// Build a GET URL scoped to the session's key and the current device.
    fn scoped_url(&self, path: &str, not_consumed_only: bool) -> Result<String> {
        let session = self.session()?;
        let device_id = self.require_device_id()?;

        let mut url = format!(
            "{}{}?public_key={}&device_id={}",
            self.base_url,
            path,
            urlencoding::encode(&session.public_key),
            urlencoding::encode(&device_id),
        );
        if not_consumed_only {
            url.push_str("&filter=not_consumed");
        }
        Ok(url)
    }

    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "POST");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PaygateError::network(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        tracing::debug!(%url, "GET");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PaygateError::network(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status().as_u16();

        if !response.status().is_success() {
            #[derive(Deserialize)]
            struct ErrorResponse {
                error: Option<String>,
                details: Option<String>,
            }

            let error_body: ErrorResponse = response.json().await.unwrap_or(ErrorResponse {
                error: Some("Unknown error".to_string()),
                details: None,
            });

            let message = match (&error_body.error, &error_body.details) {
                (Some(err), Some(details)) => format!("{}: {}", err, details),
                (Some(err), None) => err.clone(),
                (None, Some(details)) => details.clone(),
                (None, None) => format!("Request failed: {}", status),
            };
            let code = map_status_to_error_code(status);
            tracing::warn!(status, %message, "gateway error");

            return Err(PaygateError::with_status(code, message, status));
        }

        response
            .json()
            .await
            .map_err(|e| PaygateError::network(e.to_string()))
    }
}

impl std::fmt::Debug for Paygate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paygate")
            .field("base_url", &self.base_url)
            .field("initialized", &self.is_initialized())
            .field("device_id", &self.device_id())
            .finish()
    }
}

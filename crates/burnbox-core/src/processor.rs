//! Message processor
//!
//! Creates, stores and consumes messages through the injected engine. All
//! encryption and pin hashing happens here; the engine only ever sees sealed
//! payloads and pin hashes. The pin is part of the encryption key and is never
//! persisted.
//!
//! Per message the processor drives a small state machine:
//!
//! ```text
//! created --correct pin------------------> removed (returned once)
//! created --expired---------------------> removed (Expired)
//! created --wrong pin, count < max------> created, count + 1 (BadPinAttempt)
//! created --wrong pin, count reaches max-> removed (BadPin)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::crypt::{Crypter, PinHasher};
use crate::error::{Error, Result, StoreError};
use crate::file::{
    encode_file_header, is_file_message, parse_file_header, validate_content_type,
    validate_file_name, FILE_MARKER,
};
use crate::message::{Message, MessageKey};
use crate::storage::MessageStore;

/// Default cap on message lifetime (31 days)
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(31 * 24 * 3600);

/// Default number of wrong pins before a message is destroyed
pub const DEFAULT_MAX_PIN_ATTEMPTS: u32 = 3;

/// Default maximum file payload (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: usize = 1024 * 1024;

/// Processor limits
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorParams {
    /// Longest lifetime a caller may request
    pub max_duration: Duration,
    /// Wrong pins tolerated before destruction
    pub max_pin_attempts: u32,
    /// Largest file payload in bytes
    pub max_file_size: usize,
}

impl Default for ProcessorParams {
    fn default() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION,
            max_pin_attempts: DEFAULT_MAX_PIN_ATTEMPTS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ProcessorParams {
    /// Replace zero values with defaults
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            max_duration: if self.max_duration.is_zero() {
                defaults.max_duration
            } else {
                self.max_duration
            },
            max_pin_attempts: if self.max_pin_attempts == 0 {
                defaults.max_pin_attempts
            } else {
                self.max_pin_attempts
            },
            max_file_size: if self.max_file_size == 0 {
                defaults.max_file_size
            } else {
                self.max_file_size
            },
        }
    }
}

/// Text message creation request
#[derive(Clone)]
pub struct MessageRequest {
    /// Requested lifetime
    pub duration: Duration,
    /// Recipient pin
    pub pin: String,
    /// Secret payload
    pub payload: Vec<u8>,
    /// Payload already encrypted by the caller
    pub client_encrypted: bool,
}

impl MessageRequest {
    /// Server-side encrypted text message
    pub fn text(duration: Duration, pin: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            duration,
            pin: pin.into(),
            payload: payload.into(),
            client_encrypted: false,
        }
    }

    /// Opaque, caller-encrypted blob
    pub fn client_encrypted(
        duration: Duration,
        pin: impl Into<String>,
        blob: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            duration,
            pin: pin.into(),
            payload: blob.into(),
            client_encrypted: true,
        }
    }
}

/// File message creation request
#[derive(Clone)]
pub struct FileRequest {
    /// Requested lifetime
    pub duration: Duration,
    /// Recipient pin
    pub pin: String,
    /// Original file name
    pub file_name: String,
    /// Declared content type
    pub content_type: String,
    /// File bytes
    pub data: Vec<u8>,
}

/// Revealed secret content
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Secret {
    /// Decrypted text payload
    Text(Vec<u8>),
    /// Decrypted file
    File {
        /// Original file name
        file_name: String,
        /// Declared content type
        content_type: String,
        /// File bytes
        data: Vec<u8>,
    },
    /// Caller-encrypted blob, returned untouched
    Opaque(Vec<u8>),
}

/// Result of a successful reveal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revealed {
    /// Key the secret was stored under
    pub key: MessageKey,
    /// The secret itself
    pub secret: Secret,
}

impl Revealed {
    /// Whether the secret is a file
    pub fn is_file(&self) -> bool {
        matches!(self.secret, Secret::File { .. })
    }
}

/// Creates and consumes burn-after-read messages
pub struct MessageProcessor {
    params: ProcessorParams,
    store: Arc<dyn MessageStore>,
    crypter: Arc<dyn Crypter>,
    hasher: Arc<dyn PinHasher>,
    clock: Arc<dyn Clock>,
}

impl MessageProcessor {
    /// Create a processor on the wall clock
    pub fn new(
        store: Arc<dyn MessageStore>,
        crypter: Arc<dyn Crypter>,
        hasher: Arc<dyn PinHasher>,
        params: ProcessorParams,
    ) -> Self {
        let params = params.normalized();
        info!(
            "Created message processor: max_duration={:?}, max_pin_attempts={}, max_file_size={}",
            params.max_duration, params.max_pin_attempts, params.max_file_size
        );

        Self {
            params,
            store,
            crypter,
            hasher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Effective limits
    pub fn params(&self) -> &ProcessorParams {
        &self.params
    }

    /// Underlying engine
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Create and save a text message.
    ///
    /// Server-side requests are sealed with the pin; client-encrypted
    /// payloads are stored as-is.
    #[instrument(skip(self, req), fields(duration = ?req.duration, client_encrypted = req.client_encrypted))]
    pub async fn create(&self, req: MessageRequest) -> Result<Message> {
        self.check_pin_and_duration(&req.pin, req.duration)?;

        let pin_hash = self.hash_pin(&req.pin)?;

        let data = if req.client_encrypted {
            req.payload
        } else {
            self.crypter.encrypt(&req.payload, &req.pin).map_err(|e| {
                error!("Failed to encrypt message: {}", e);
                Error::Crypto(e.to_string())
            })?
        };

        self.persist(req.duration, data, pin_hash, req.client_encrypted)
            .await
    }

    /// Create and save a file message.
    ///
    /// Only the file marker is left in the clear; name, content type and
    /// bytes are sealed together.
    #[instrument(skip(self, req), fields(duration = ?req.duration, size = req.data.len()))]
    pub async fn create_file(&self, req: FileRequest) -> Result<Message> {
        self.check_pin_and_duration(&req.pin, req.duration)?;

        if let Err(e) = validate_file_name(&req.file_name) {
            warn!("Save rejected, invalid file name");
            return Err(e);
        }
        if let Err(e) = validate_content_type(&req.content_type) {
            warn!("Save rejected, invalid content type");
            return Err(e);
        }

        if req.data.len() > self.params.max_file_size {
            warn!(
                "Save rejected, file too large: {} > {}",
                req.data.len(),
                self.params.max_file_size
            );
            return Err(Error::FileTooLarge {
                size: req.data.len(),
                max: self.params.max_file_size,
            });
        }

        let pin_hash = self.hash_pin(&req.pin)?;

        let mut plain = encode_file_header(&req.file_name, &req.content_type);
        plain.extend_from_slice(&req.data);

        let sealed = self.crypter.encrypt(&plain, &req.pin).map_err(|e| {
            error!("Failed to encrypt file: {}", e);
            Error::Crypto(e.to_string())
        })?;

        let mut data = Vec::with_capacity(FILE_MARKER.len() + sealed.len());
        data.extend_from_slice(FILE_MARKER);
        data.extend_from_slice(&sealed);

        self.persist(req.duration, data, pin_hash, false).await
    }

    /// Verify the pin and consume the message.
    ///
    /// A successful call removes the record, so a message is returned at most
    /// once. File messages come back with the marker re-attached so
    /// [`parse_file_header`] works on the result.
    #[instrument(skip(self, pin))]
    pub async fn load(&self, key: &MessageKey, pin: &str) -> Result<Message> {
        let mut msg = match self.store.load(key).await {
            Ok(msg) => msg,
            Err(StoreError::LoadRejected) => return Err(Error::NotFound),
            Err(e) => return Err(e.into()),
        };

        if msg.is_expired(self.clock.now()) {
            warn!("Message {} expired at {}", key, msg.expires_at);
            self.discard(key).await;
            return Err(Error::Expired);
        }

        if !self.hasher.verify(&msg.pin_hash, pin) {
            return Err(self.record_bad_pin(msg).await);
        }

        // Removal is the claim: only the caller that actually deletes the
        // record gets to see its content.
        match self.store.remove(key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Message {} consumed concurrently", key);
                return Err(Error::NotFound);
            }
            Err(e) => warn!("Failed to remove message {}: {}", key, e),
        }

        if msg.client_encrypted {
            debug!("Returning client-encrypted message {}", key);
            return Ok(msg);
        }

        let is_file = is_file_message(&msg.data);
        let sealed = if is_file {
            &msg.data[FILE_MARKER.len()..]
        } else {
            &msg.data[..]
        };

        let plain = match self.crypter.decrypt(sealed, pin) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("Can't decrypt message {}: {}", key, e);
                return Err(Error::BadPin);
            }
        };

        msg.data = if is_file {
            let mut data = Vec::with_capacity(FILE_MARKER.len() + plain.len());
            data.extend_from_slice(FILE_MARKER);
            data.extend_from_slice(&plain);
            data
        } else {
            plain
        };

        info!("Message {} revealed and removed", key);
        Ok(msg)
    }

    /// Consume a message and classify its content
    pub async fn reveal(&self, key: &MessageKey, pin: &str) -> Result<Revealed> {
        let msg = self.load(key, pin).await?;

        let secret = if msg.client_encrypted {
            Secret::Opaque(msg.data)
        } else if is_file_message(&msg.data) {
            let header = parse_file_header(&msg.data).ok_or_else(|| {
                error!("Malformed file header in message {}", key);
                Error::Internal("malformed file header".to_string())
            })?;
            Secret::File {
                file_name: header.file_name,
                content_type: header.content_type,
                data: msg.data[header.data_offset..].to_vec(),
            }
        } else {
            Secret::Text(msg.data)
        };

        Ok(Revealed {
            key: msg.key,
            secret,
        })
    }

    /// Best-effort check whether a live message holds a file.
    ///
    /// Never consumes the message. Client-encrypted blobs are opaque and
    /// report `false`.
    pub async fn is_file(&self, key: &MessageKey) -> bool {
        match self.store.load(key).await {
            Ok(msg) => {
                !msg.client_encrypted
                    && !msg.is_expired(self.clock.now())
                    && is_file_message(&msg.data)
            }
            Err(_) => false,
        }
    }

    fn check_pin_and_duration(&self, pin: &str, duration: Duration) -> Result<()> {
        if pin.is_empty() {
            warn!("Save rejected, empty pin");
            return Err(Error::BadPin);
        }

        if duration > self.params.max_duration {
            warn!(
                "Save rejected, duration {:?} > {:?}",
                duration, self.params.max_duration
            );
            return Err(Error::BadDuration {
                requested: duration,
                max: self.params.max_duration,
            });
        }

        Ok(())
    }

    fn hash_pin(&self, pin: &str) -> Result<String> {
        self.hasher.hash(pin).map_err(|e| {
            error!("Can't hash pin: {}", e);
            Error::Internal(format!("pin hashing failed: {e}"))
        })
    }

    async fn persist(
        &self,
        duration: Duration,
        data: Vec<u8>,
        pin_hash: String,
        client_encrypted: bool,
    ) -> Result<Message> {
        let bad_duration = || {
            warn!("Save rejected, duration {:?} overflows the clock", duration);
            Error::BadDuration {
                requested: duration,
                max: self.params.max_duration,
            }
        };
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(bad_duration)?;

        let key = MessageKey::generate().map_err(|e| {
            error!("Can't generate message key: {}", e);
            Error::Internal(format!("key generation failed: {e}"))
        })?;

        let msg = Message {
            key,
            expires_at,
            data,
            pin_hash,
            errors: 0,
            client_encrypted,
        };

        self.store.save(&msg).await?;
        debug!("Saved message {}, expires at {}", msg.key, msg.expires_at);
        Ok(msg)
    }

    async fn record_bad_pin(&self, mut msg: Message) -> Error {
        let attempts = match self.store.increment_errors(&msg.key).await {
            Ok(count) => count,
            Err(StoreError::LoadRejected) => return Error::BadPin,
            Err(e) => return e.into(),
        };

        warn!("Wrong pin provided for {} ({} times)", msg.key, attempts);

        if attempts >= self.params.max_pin_attempts {
            info!("Pin attempts exhausted for {}, removing", msg.key);
            self.discard(&msg.key).await;
            return Error::BadPin;
        }

        msg.errors = attempts;
        Error::BadPinAttempt {
            attempts,
            message: Box::new(msg),
        }
    }

    async fn discard(&self, key: &MessageKey) {
        if let Err(e) = self.store.remove(key).await {
            warn!("Failed to remove message {}: {}", key, e);
        }
    }
}

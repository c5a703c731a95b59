//! Builder pattern for socket configuration.
//!
//! Provides a fluent API for configuring and creating [`ReconnectingSocket`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use reconnecting_socket::{ReconnectOptions, ReconnectingSocket};
//!
//! # async fn example() -> reconnecting_socket::Result<()> {
//! let socket = ReconnectingSocket::builder("wss://stream.example.com/live")
//!     .protocol("v2.stream")
//!     .options(ReconnectOptions::new().with_reconnection_attempts(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tokio::runtime::Handle;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::{BinaryType, Connector, TungsteniteConnector};

use super::core::ReconnectingSocket;
use super::options::ReconnectOptions;

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`ReconnectingSocket`].
///
/// Use [`ReconnectingSocket::builder()`] to create a new builder.
#[derive(Clone)]
pub struct SocketBuilder {
    /// Endpoint URL, validated on build.
    url: String,
    /// Requested sub-protocols, in preference order.
    protocols: Vec<String>,
    /// Reconnection options.
    options: ReconnectOptions,
    /// Transport factory. Defaults to [`TungsteniteConnector`].
    connector: Option<Arc<dyn Connector>>,
    /// Initial binary framing preference.
    binary_type: BinaryType,
}

impl fmt::Debug for SocketBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketBuilder")
            .field("url", &self.url)
            .field("protocols", &self.protocols)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .field("binary_type", &self.binary_type)
            .finish()
    }
}

// ============================================================================
// SocketBuilder Implementation
// ============================================================================

impl SocketBuilder {
    /// Creates a builder for `url` with default options.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            options: ReconnectOptions::default(),
            connector: None,
            binary_type: BinaryType::default(),
        }
    }

    /// Adds one requested sub-protocol.
    #[inline]
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Adds several requested sub-protocols.
    #[must_use]
    pub fn protocols(mut self, protocols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.protocols.extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Sets the reconnection options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ReconnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the transport factory.
    ///
    /// Useful for alternative transports and for tests.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Sets the initial binary framing preference.
    #[inline]
    #[must_use]
    pub fn binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = binary_type;
        self
    }

    /// Builds the socket and schedules the first connection attempt.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL does not parse or is not `ws`/`wss`
    /// - [`Error::InvalidArgument`] if a sub-protocol is empty or repeated
    /// - [`Error::Config`] if the options are invalid or no runtime is running
    pub fn build(self) -> Result<ReconnectingSocket> {
        let url = self.validate_url()?;
        self.validate_protocols()?;
        self.options.validate()?;

        let runtime = Handle::try_current().map_err(|e| {
            Error::config(format!(
                "ReconnectingSocket must be built inside a tokio runtime: {e}"
            ))
        })?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector::new()));

        Ok(ReconnectingSocket::start(
            url,
            self.protocols,
            self.options,
            connector,
            runtime,
            self.binary_type,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SocketBuilder {
    /// Parses the URL and checks its scheme.
    fn validate_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url).map_err(|e| Error::invalid_url(&self.url, e.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(Error::invalid_url(
                &self.url,
                format!("Unsupported scheme '{scheme}', expected ws or wss"),
            )),
        }
    }

    /// Rejects empty and duplicate sub-protocols.
    fn validate_protocols(&self) -> Result<()> {
        let mut seen = FxHashSet::default();

        for protocol in &self.protocols {
            if protocol.is_empty() {
                return Err(Error::invalid_argument("Sub-protocol must not be empty"));
            }
            if !seen.insert(protocol.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "Duplicate sub-protocol: {protocol}"
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

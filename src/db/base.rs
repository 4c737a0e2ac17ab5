// Base Provider
// Shared state every concrete provider starts from: name, owned session, config bag

use std::collections::HashMap;

use crate::db::connection::EngineSession;
use crate::db::traits::ProviderError;

pub struct ProviderBase {
    /// Engine label used in messages, e.g. "SQL Server"
    engine: &'static str,
    name: String,
    session: Option<Box<dyn EngineSession>>,
    config: HashMap<String, String>,
}

impl ProviderBase {
    pub fn new(engine: &'static str, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            session: None,
            config: HashMap::new(),
        }
    }

    /// Add a free-form provider setting
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn engine(&self) -> &'static str {
        self.engine
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    /// Connected means a usable session is held
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Take ownership of a freshly opened session and adopt the database's name
    pub fn attach(&mut self, session: Box<dyn EngineSession>, name: impl Into<String>) {
        self.session = Some(session);
        self.name = name.into();
    }

    /// Borrow the live session, or fail with `NotConnected` for `operation`
    pub fn session(&mut self, operation: &str) -> Result<&mut (dyn EngineSession + 'static), ProviderError> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => {
                tracing::error!("{} called on '{}' while not connected", operation, self.name);
                Err(ProviderError::NotConnected)
            }
        }
    }

    /// Close and drop the session, if any. Returns whether one was held.
    pub async fn release(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("Disconnect on '{}' ignored, not connected", self.name);
            return false;
        };

        if let Err(e) = session.close().await {
            tracing::warn!("Error while closing connection to '{}': {}", self.name, e);
        }
        tracing::info!("Disconnected from '{}'", self.name);
        true
    }

    /// Error for an operation this engine does not provide (connection is checked first)
    pub fn unsupported(&self, operation: &'static str) -> ProviderError {
        if !self.is_connected() {
            tracing::error!("{} called on '{}' while not connected", operation, self.name);
            return ProviderError::NotConnected;
        }
        self.not_implemented(operation)
    }

    pub fn not_implemented(&self, operation: &'static str) -> ProviderError {
        tracing::error!("{} is not implemented by the {} provider", operation, self.engine);
        ProviderError::NotImplemented {
            provider: self.engine,
            operation,
        }
    }
}

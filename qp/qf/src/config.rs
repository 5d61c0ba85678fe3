//! Framework configuration

use qp_core::{QError, QResult, QSignal};

use crate::{QF_MAX_ACTIVE, QF_MAX_PUB_SIG, QF_MAX_TICK_RATE};

/// Runtime limits of a [`QF`](crate::QF) instance, each bounded by the
/// matching compile-time capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QFConfig {
    pub max_active: u8,
    pub tick_rates: u8,
    pub max_pub_signal: u16,
}

impl QFConfig {
    /// Every capacity at its compile-time maximum
    pub const DEFAULT: Self = Self {
        max_active: QF_MAX_ACTIVE as u8,
        tick_rates: QF_MAX_TICK_RATE as u8,
        max_pub_signal: QF_MAX_PUB_SIG as u16,
    };

    pub fn builder() -> QFConfigBuilder {
        QFConfigBuilder::new()
    }

    /// Whether `prio` can be registered
    pub fn valid_prio(&self, prio: u8) -> bool {
        prio >= 1 && prio <= self.max_active
    }

    /// Whether `sig` can be published
    pub fn valid_pub_signal(&self, sig: QSignal) -> bool {
        !sig.is_reserved() && sig.0 < self.max_pub_signal
    }
}

impl Default for QFConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builder for [`QFConfig`]
#[derive(Debug, Clone, Copy)]
pub struct QFConfigBuilder {
    config: QFConfig,
}

impl QFConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: QFConfig::DEFAULT,
        }
    }

    pub fn max_active(mut self, n: u8) -> Self {
        self.config.max_active = n;
        self
    }

    pub fn tick_rates(mut self, n: u8) -> Self {
        self.config.tick_rates = n;
        self
    }

    pub fn max_pub_signal(mut self, n: u16) -> Self {
        self.config.max_pub_signal = n;
        self
    }

    pub fn build(self) -> QResult<QFConfig> {
        let c = self.config;
        if c.max_active == 0 || c.max_active as usize > QF_MAX_ACTIVE {
            return Err(QError::InvalidConfig);
        }
        if c.tick_rates == 0 || c.tick_rates as usize > QF_MAX_TICK_RATE {
            return Err(QError::InvalidConfig);
        }
        if c.max_pub_signal <= QSignal::USER.0 || c.max_pub_signal as usize > QF_MAX_PUB_SIG {
            return Err(QError::InvalidConfig);
        }
        Ok(c)
    }
}

impl Default for QFConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

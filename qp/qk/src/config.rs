//! Kernel configuration

use qp_qf::QFConfig;

/// Board callback without arguments
pub type QKCallback = fn();

fn noop() {}

fn spin() {
    core::hint::spin_loop();
}

/// Framework limits plus the board callbacks the kernel invokes
#[derive(Debug, Clone, Copy)]
pub struct QKConfig {
    pub qf: QFConfig,
    /// Runs once in `start_scheduler`, before the first scheduling pass
    pub on_startup: QKCallback,
    /// Runs whenever nothing is ready, outside any critical section
    pub on_idle: QKCallback,
    /// Runs on `shutdown`
    pub on_cleanup: QKCallback,
}

impl QKConfig {
    pub const DEFAULT: Self = Self {
        qf: QFConfig::DEFAULT,
        on_startup: noop,
        on_idle: spin,
        on_cleanup: noop,
    };

    pub fn builder() -> QKConfigBuilder {
        QKConfigBuilder::new()
    }
}

impl Default for QKConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Builder for [`QKConfig`]
#[derive(Debug, Clone, Copy)]
pub struct QKConfigBuilder {
    config: QKConfig,
}

impl QKConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: QKConfig::DEFAULT,
        }
    }

    /// Framework limits, already validated by [`QFConfig::builder`]
    pub fn framework(mut self, qf: QFConfig) -> Self {
        self.config.qf = qf;
        self
    }

    pub fn on_startup(mut self, f: QKCallback) -> Self {
        self.config.on_startup = f;
        self
    }

    pub fn on_idle(mut self, f: QKCallback) -> Self {
        self.config.on_idle = f;
        self
    }

    pub fn on_cleanup(mut self, f: QKCallback) -> Self {
        self.config.on_cleanup = f;
        self
    }

    pub fn build(self) -> QKConfig {
        self.config
    }
}

impl Default for QKConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

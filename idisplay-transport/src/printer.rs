//! MonitorTransport middleware for tracing transport operations
//!
//! Wraps any Transport and logs every report passing through it.
//!
//! # Example
//!
//! ```ignore
//! use idisplay_transport::{HidDiscovery, MonitorConfig, MonitorTransport};
//!
//! let transport = HidDiscovery::new().open_first()?;
//! let monitored = MonitorTransport::wrap(transport, MonitorConfig::default().with_hex(true));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::protocol::{describe_feature_report, describe_output_report};
use crate::{InputReport, Transport, TransportDeviceInfo, TransportError};

/// Bytes shown in a hex dump before truncating
const HEX_PREVIEW: usize = 32;

/// Configuration for the MonitorTransport
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Show raw hex dump alongside decoded output
    pub show_hex: bool,
}

impl MonitorConfig {
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }
}

/// Transport middleware that logs all reports
pub struct MonitorTransport {
    inner: Arc<dyn Transport>,
    config: MonitorConfig,
}

impl MonitorTransport {
    /// Wrap a transport with monitoring middleware
    pub fn wrap(transport: Arc<dyn Transport>, config: MonitorConfig) -> Arc<dyn Transport> {
        Arc::new(Self {
            inner: transport,
            config,
        })
    }

    fn hex(&self, data: &[u8]) -> String {
        if !self.config.show_hex {
            return String::new();
        }
        let shown = &data[..data.len().min(HEX_PREVIEW)];
        let mut out: String = shown.iter().map(|b| format!(" {b:02x}")).collect();
        if data.len() > HEX_PREVIEW {
            out.push_str(" ...");
        }
        out
    }
}

#[async_trait]
impl Transport for MonitorTransport {
    async fn write_output_report(&self, data: &[u8]) -> Result<(), TransportError> {
        let result = self.inner.write_output_report(data).await;
        info!(
            target: "idisplay::monitor",
            "OUT  {} -> {}{}",
            describe_output_report(data),
            if result.is_ok() { "ok" } else { "FAILED" },
            self.hex(data)
        );
        result
    }

    async fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        let result = self.inner.send_feature_report(data).await;
        info!(
            target: "idisplay::monitor",
            "FEAT {} -> {}{}",
            describe_feature_report(data),
            if result.is_ok() { "ok" } else { "FAILED" },
            self.hex(data)
        );
        result
    }

    fn subscribe_input(&self) -> Option<broadcast::Receiver<InputReport>> {
        self.inner.subscribe_input()
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }

    async fn close(&self) -> Result<(), TransportError> {
        info!(target: "idisplay::monitor", "CLOSE {}", self.inner.device_info().device_path);
        self.inner.close().await
    }
}

//! Export packager.
//!
//! Builds the bundle handed to the manufacturing line after a session. Only
//! public data goes in: the device public key and, when a host key is
//! configured, the RMA token sealed to it. Seeds, root key shares and the
//! plain token never reach this module.

use serde::{Deserialize, Serialize};

use crate::generator::PublicExportable;
use crate::lifecycle::LifecycleState;
use crate::rma_wrap::WrappedRmaToken;

/// How the session that produced a bundle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Secrets generated, written and locked by this session.
    Provisioned,
    /// Partition found locked; nothing was done.
    AlreadyProvisioned,
    /// Secrets from an interrupted session were locked by this one.
    Resumed,
}

/// Non-secret personalization artifacts.
///
/// Contains no timestamps or counters, so repeated short-circuit sessions
/// on the same unit produce identical bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub format_version: u32,
    pub status: ExportStatus,
    pub lifecycle_state: LifecycleState,
    /// Hex SEC1 compressed device public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_rma_token: Option<WrappedRmaToken>,
}

impl ExportBundle {
    /// Whether the bundle carries freshly generated material.
    pub fn has_material(&self) -> bool {
        self.device_public_key.is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Assembles export bundles for one device.
#[derive(Debug, Clone, Copy)]
pub struct ExportPackager {
    format_version: u32,
    lifecycle_state: LifecycleState,
}

impl ExportPackager {
    pub fn new(format_version: u32, lifecycle_state: LifecycleState) -> Self {
        Self {
            format_version,
            lifecycle_state,
        }
    }

    /// Bundle the public artifacts of a fresh session.
    pub fn package_export(&self, public: PublicExportable) -> ExportBundle {
        ExportBundle {
            format_version: self.format_version,
            status: ExportStatus::Provisioned,
            lifecycle_state: self.lifecycle_state,
            device_public_key: Some(hex::encode(public.device_public_key)),
            wrapped_rma_token: public.wrapped_rma_token,
        }
    }

    /// Bundle for a session that generated nothing. The public artifacts of
    /// the earlier session are not recoverable from the device.
    pub fn package_without_material(&self, status: ExportStatus) -> ExportBundle {
        ExportBundle {
            format_version: self.format_version,
            status,
            lifecycle_state: self.lifecycle_state,
            device_public_key: None,
            wrapped_rma_token: None,
        }
    }
}

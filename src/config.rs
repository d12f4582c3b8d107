//! Construction-time configuration for the bridge.

use serde::{Deserialize, Serialize};

/// Caps applied to the software-fallback pixel buffer.
///
/// Defaults to a 1920x1080 cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for SoftwareLimits {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Construction-time configuration for a `VideoOutput`.
///
/// `width`/`height` of `0` mean "auto" (follow the decoder's reported dimensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub width: u32,
    pub height: u32,
    pub enable_hardware_acceleration: bool,
    pub software_limits: SoftwareLimits,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            enable_hardware_acceleration: true,
            software_limits: SoftwareLimits::default(),
        }
    }
}

impl BridgeConfig {
    /// Normalizes the configuration, forcing hardware acceleration on when the crate was built
    /// without the `software-fallback` feature (there is nothing to fall back to).
    pub fn normalized(mut self) -> Self {
        if cfg!(not(feature = "software-fallback")) {
            self.enable_hardware_acceleration = true;
        }
        self
    }

    /// Whether dimensions should be taken from the decoder rather than fixed at construction.
    pub fn auto_dimensions(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

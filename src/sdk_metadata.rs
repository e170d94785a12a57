use serde::{Deserialize, Serialize};

/// SDK and host identification attached to every record sent to the control plane and used to
/// namespace per-instance telemetry keys in a shared backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkMetadata {
    /// SDK language and version, e.g. `rust-0.1.0`.
    #[serde(rename = "s")]
    pub sdk_version: String,
    /// Address of the host running the SDK.
    #[serde(rename = "i")]
    pub machine_ip: String,
    /// Name of the host (instance) running the SDK.
    #[serde(rename = "n")]
    pub machine_name: String,
}

impl SdkMetadata {
    /// Version string reported by this crate.
    pub fn current_version() -> String {
        format!("rust-{}", env!("CARGO_PKG_VERSION"))
    }

    /// Create metadata for the current SDK version.
    pub fn new(machine_name: impl Into<String>, machine_ip: impl Into<String>) -> SdkMetadata {
        SdkMetadata {
            sdk_version: SdkMetadata::current_version(),
            machine_ip: machine_ip.into(),
            machine_name: machine_name.into(),
        }
    }
}

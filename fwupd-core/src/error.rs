// Licensed under the Apache-2.0 license

use thiserror::Error;

/// Errors from a byte-level transport (I2C/SPI) to a device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport send/receive failed: {0}")]
    Io(String),
    #[error("transport timed out waiting for a response")]
    Timeout,
    #[error("device is not present at the configured address")]
    NotPresent,
}

/// Errors surfaced by a device driver once a transport-level retry budget
/// is exhausted. Corresponds to `DriverError` in spec.md Table 7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("image failed verification: {0}")]
    InvalidImage(String),
    #[error("device refused command {cmd:#04x}: {reason}")]
    Refused { cmd: u8, reason: String },
    #[error("post-update CRC mismatch: device reports {actual:#010x}, image declared {expected:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("no writes remaining on device")]
    WritesExhausted,
    #[error("device write budget is low ({remaining} remaining); pass force=true to proceed")]
    LowWriteBudget { remaining: u32 },
    #[error("device already matches the requested image; pass force=true to reprogram")]
    AlreadyUpToDate,
    #[error("operation unsupported by this device: {0}")]
    Unsupported(String),
    #[error("a required resource was already in use: {0}")]
    ResourceBusy(String),
    #[error("external process {program} exited with status {status}")]
    ExternalProcess { program: String, status: i32 },
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the update pipeline (package ingestion through
/// activation request). Corresponds to `ImageError`/`ConcurrencyError` in
/// spec.md Table 7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("an update is already in progress for this domain")]
    Unavailable,
    #[error("failed to extract package: {0}")]
    ExtractFailed(String),
    #[error("manifest is missing required key {0}")]
    MissingManifestKey(String),
    #[error("machine name mismatch: running machine is {running}, image targets {image}")]
    MachineMismatch { running: String, image: String },
    #[error("required artifact {0} was not found in the extracted package")]
    MissingArtifact(String),
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("filesystem error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}

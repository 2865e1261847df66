//! Driver result classification and error types
//!
//! Every driver call made by this crate funnels its result through an
//! [`ErrorDomain`]: the raw `vk::Result` is classified into an [`ErrorKind`],
//! reported to the domain's handler chain and finally surfaced to the caller
//! as a [`GfxError`].

mod domain;

use std::fmt;
use std::time::Duration;

use ash::vk;

use crate::config::ConfigError;
use crate::device::DeviceId;

pub use domain::{default_handler, ErrorCallback, ErrorDomain, ErrorHandler};
#[cfg(test)]
pub(crate) use domain::RecordingHandler;

/// Result type for fallible operations of this crate
pub type GfxResult<T> = Result<T, GfxError>;

/// Domain classification of a driver result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The call succeeded
    Success,
    /// The logical device has been lost
    DeviceLost,
    /// A requested device is not known
    DeviceNotFound,
    /// A requested feature is not supported
    FeatureNotPresent,
    /// The surface no longer matches the swapchain exactly
    SurfaceSuboptimal,
    /// The surface changed and the swapchain must be recreated
    SurfaceOutOfDate,
    /// Driver or object initialization failed
    InitializationFailed,
    /// Device memory is exhausted
    OutOfDeviceMemory,
    /// Mapping device memory into the host address space failed
    MemoryMapFailed,
    /// A validation layer rejected a call
    ValidationFailed,
    /// The native window is already owned by another surface
    NativeWindowInUse,
    /// Any result without a dedicated classification
    Unknown,
}

/// How serious a reported [`ErrorKind`] is
///
/// Severity is advisory: only [`default_handler`] acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Nothing to report
    None,
    /// Informational
    Info,
    /// Execution can continue
    Warning,
    /// Fatal unless the default handler is overridden
    Fatal,
}

/// Classify a raw driver result
pub const fn classify(result: vk::Result) -> ErrorKind {
    match result {
        vk::Result::SUCCESS => ErrorKind::Success,
        vk::Result::ERROR_DEVICE_LOST => ErrorKind::DeviceLost,
        vk::Result::ERROR_FEATURE_NOT_PRESENT => ErrorKind::FeatureNotPresent,
        vk::Result::ERROR_INITIALIZATION_FAILED => ErrorKind::InitializationFailed,
        vk::Result::ERROR_OUT_OF_DATE_KHR => ErrorKind::SurfaceOutOfDate,
        vk::Result::SUBOPTIMAL_KHR => ErrorKind::SurfaceSuboptimal,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => ErrorKind::OutOfDeviceMemory,
        vk::Result::ERROR_MEMORY_MAP_FAILED => ErrorKind::MemoryMapFailed,
        vk::Result::ERROR_VALIDATION_FAILED_EXT => ErrorKind::ValidationFailed,
        vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => ErrorKind::NativeWindowInUse,
        _ => ErrorKind::Unknown,
    }
}

/// Severity of an error kind
pub const fn severity_of(kind: ErrorKind) -> Severity {
    match kind {
        ErrorKind::Success => Severity::None,
        ErrorKind::DeviceNotFound | ErrorKind::FeatureNotPresent | ErrorKind::SurfaceSuboptimal => {
            Severity::Warning
        }
        ErrorKind::DeviceLost
        | ErrorKind::SurfaceOutOfDate
        | ErrorKind::InitializationFailed
        | ErrorKind::OutOfDeviceMemory
        | ErrorKind::MemoryMapFailed
        | ErrorKind::ValidationFailed
        | ErrorKind::NativeWindowInUse
        | ErrorKind::Unknown => Severity::Fatal,
    }
}

impl ErrorKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 12] = [
        Self::Success,
        Self::DeviceLost,
        Self::DeviceNotFound,
        Self::FeatureNotPresent,
        Self::SurfaceSuboptimal,
        Self::SurfaceOutOfDate,
        Self::InitializationFailed,
        Self::OutOfDeviceMemory,
        Self::MemoryMapFailed,
        Self::ValidationFailed,
        Self::NativeWindowInUse,
        Self::Unknown,
    ];

    /// Severity of this kind
    pub const fn severity(self) -> Severity {
        severity_of(self)
    }

    /// Whether this kind is [`ErrorKind::Success`]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human readable description
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::DeviceLost => "DeviceLost: the device has been lost",
            Self::DeviceNotFound => "DeviceNotFound: the requested device was not found on the system",
            Self::FeatureNotPresent => "FeatureNotPresent: a requested feature is not supported by this system",
            Self::SurfaceSuboptimal => "SurfaceSuboptimal: the surface is not an exact match for the window",
            Self::SurfaceOutOfDate => "SurfaceOutOfDate: the swapchain can no longer present to the surface",
            Self::InitializationFailed => "InitializationFailed: driver initialization failed",
            Self::OutOfDeviceMemory => "OutOfDeviceMemory: available device memory has been depleted",
            Self::MemoryMapFailed => "MemoryMapFailed: a host-device memory mapping has failed",
            Self::ValidationFailed => "ValidationFailed: a validation layer rejected the call",
            Self::NativeWindowInUse => "NativeWindowInUse: the native window is already in use",
            Self::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Fatal => "Fatal",
        };
        f.write_str(name)
    }
}

impl From<vk::Result> for ErrorKind {
    fn from(result: vk::Result) -> Self {
        classify(result)
    }
}

/// Errors returned by this crate
#[derive(thiserror::Error, Debug)]
pub enum GfxError {
    /// A driver call failed; the failure was already reported
    #[error("{kind} ({result})")]
    Driver {
        /// Domain classification
        kind: ErrorKind,
        /// Raw driver result
        result: vk::Result,
    },

    /// No device is registered under the id
    #[error("device {0} is not registered")]
    DeviceNotFound(DeviceId),

    /// No memory type satisfies the filter and property flags
    #[error("no memory type matches filter {filter:#034b} with properties {flags:?}")]
    NoSuitableMemoryType {
        /// Memory type bitmask from the resource requirements
        filter: u32,
        /// Requested property flags
        flags: vk::MemoryPropertyFlags,
    },

    /// A bounded fence wait expired
    #[error("fence wait timed out after {0:?}")]
    TimedOut(Duration),

    /// The operation is illegal in the object's current state
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What was wrong
        reason: String,
    },

    /// A byte range does not fit the memory region
    #[error("range {offset}+{size} exceeds the {available} available bytes")]
    OutOfRange {
        /// Requested offset
        offset: vk::DeviceSize,
        /// Requested size
        size: vk::DeviceSize,
        /// Bytes available in the region
        available: vk::DeviceSize,
    },

    /// Host access was requested on memory that is not host visible
    #[error("memory region is not host visible")]
    NotHostVisible,

    /// Configuration could not be loaded or saved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GfxError {
    /// Shorthand for [`GfxError::InvalidState`]
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState { reason: reason.into() }
    }

    /// Domain classification, if the error came from the driver or device lookup
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Driver { kind, .. } => Some(*kind),
            Self::DeviceNotFound(_) => Some(ErrorKind::DeviceNotFound),
            Self::NoSuitableMemoryType { .. } => Some(ErrorKind::FeatureNotPresent),
            _ => None,
        }
    }
}

/// An input device as presented to the host.
#[derive(Debug, Clone)]
pub struct InputDevice {
    /// Stable device identifier, as reported by the audio backend.
    pub id: String,
    /// Human-readable device description.
    pub description: String,
    /// Whether this is the device currently stored in the configuration.
    pub selected: bool,
}

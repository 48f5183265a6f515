//! Realtime output device capability.
//!
//! The engine never touches a device directly. Hosts attach an [`OutputSink`]
//! so `resume()` can wake a device that the platform suspended (browsers and
//! some OSes gate output until the user interacts).

use crate::error::SinkError;

pub trait OutputSink: Send {
    /// True when the device is not currently pulling audio.
    fn is_suspended(&self) -> bool;

    /// Start pulling audio again.
    fn resume(&mut self) -> Result<(), SinkError>;
}

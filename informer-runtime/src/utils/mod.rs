//! Helpers for manipulating built-in streams

mod backoff_reset_timer;
mod backoff_resettable;
mod event_flatten;
mod stream_backoff;
mod watch_ext;

pub use backoff_reset_timer::ResetTimerBackoff;
pub use backoff_resettable::{ResettableBackoff, ResettableBackoffWrapper};
pub use event_flatten::EventFlatten;
pub use stream_backoff::StreamBackoff;
pub use watch_ext::WatchStreamExt;

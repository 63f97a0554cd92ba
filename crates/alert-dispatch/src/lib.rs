//! Priority-routed error alert fan-out.
//!
//! See [`notification::NotificationDispatcher`] for the entry point.

pub mod clock;
pub mod error;
pub mod notification;

pub use error::{Error, Result};

//! Core observer primitives for prism-view.
//!
//! This crate provides the signal/slot mechanism the view engine uses for all
//! of its outbound notification streams, plus shared logging target names.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//!
//! # Example
//!
//! ```
//! use prism_view_core::Signal;
//!
//! let count_changed = Signal::<usize>::new();
//!
//! let id = count_changed.connect(|count| {
//!     println!("count is now {count}");
//! });
//!
//! count_changed.emit(3);
//! count_changed.disconnect(id);
//! ```

pub mod logging;
mod signal;

pub use signal::{ConnectionId, Signal};

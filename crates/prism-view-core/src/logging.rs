//! Logging facilities for prism-view.
//!
//! The engine is instrumented with the `tracing` crate. To see logs, install
//! a subscriber in the host application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core primitives target.
    pub const CORE: &str = "prism_view_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "prism_view_core::signal";
    /// View refresh pipeline target.
    pub const REFRESH: &str = "prism_view::refresh";
    /// Pager / page negotiation target.
    pub const PAGER: &str = "prism_view::pager";
    /// Group engine target.
    pub const GROUP: &str = "prism_view::group";
    /// Transaction manager target.
    pub const TRANSACTION: &str = "prism_view::transaction";
}

//! Reliable inter-processor messaging over MTU-limited serial links.
//!
//! Messages up to 65535 bytes are split into fixed 73-byte frames, each
//! protected by a CRC-32, and rebuilt in order on the far side.
//!
//! # Crate Structure
//!
//! - [`transport`]: link contract, events, and an in-memory loopback link
//! - [`frame`]: frame codec, fragmentation, and reassembly
//! - [`backend`]: single-endpoint transfer coordinator (behind `backend` feature)

/// Re-export transport types.
pub mod transport {
    pub use uartipc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use uartipc_frame::*;
}

/// Re-export backend types (requires `backend` feature).
#[cfg(feature = "backend")]
pub mod backend {
    pub use uartipc_backend::*;
}

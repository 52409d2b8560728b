//! Prompt-delimited reply framing for hypervisor monitor consoles.
//!
//! The human monitor protocol has no length field. Every reply is terminated
//! by the prompt the monitor prints when it is ready for the next command:
//!
//! ```text
//! <reply text>(qemu) <reply text>(qemu) ...
//! ```
//!
//! A reply that itself contains the prompt sequence will be split in two.
//! That is a limitation of the wire format, not of this crate.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{split_frame, Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, PROMPT_MARKER};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::CommandWriter;

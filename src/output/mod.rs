//! Serial hand-off of accepted glyphs.
//!
//! Wire format, per accepted glyph, rows sent bottom (index 4) to top:
//!
//! ```text
//! 0x00 0x00 c0 c1 c2 c3 c4    row 4
//! 0x00 0x00 c0 c1 c2 c3 c4    row 3
//! ...
//! 0x00 0x00 c0 c1 c2 c3 c4    row 0
//! ```
//!
//! Every byte is written on its own. Cells are raw `0`/`1`, not packed.
//! There is no acknowledgement, retry or checksum. The link is opened for
//! one message and closed afterwards.

mod channel;
mod serial;

pub use channel::{encode_glyph, OutputChannel, OutputDispatcher, FRAME_PREAMBLE, MESSAGE_LEN};
pub use serial::{
    MemoryConnector, SerialConnector, SerialPortConnector, SerialSettings, DEFAULT_BAUD_RATE,
};

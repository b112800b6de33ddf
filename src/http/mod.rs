//! Transport-level building blocks shared by requests and sockets.

mod bytestr;
mod map;
mod method;
mod payload;
mod version;

pub use bytes::Bytes;
pub use bytestr::ByteStr;
pub use map::{Iter, MultiMap, Values};
pub use method::Method;
pub use payload::Payload;
pub use version::Version;

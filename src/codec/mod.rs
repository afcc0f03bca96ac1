//! Codec module - serialization/deserialization for structured payloads.
//!
//! Only control data is encoded: inbound [`Part`](crate::message::Part)s and
//! outbound failure [`Status`](crate::message::Status)es. Output chunks are
//! written to the pipe as raw bytes and never pass through a codec.
//!
//! # Example
//!
//! ```
//! use edgestream::codec::MsgPackCodec;
//! use edgestream::message::Part;
//!
//! let encoded = MsgPackCodec::encode(&Part::parameters(100, 200)).unwrap();
//! let decoded: Part = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Part::parameters(100, 200));
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;

//! Protocol buffers bindings for `callsocket` connections.
//!
//! Messages are framed with a varint length delimiter, the way
//! `prost::Message::encode_length_delimited` writes them.

mod prost_codec;

pub use prost_codec::ProstDecoder;
pub use prost_codec::ProstEncoder;

use std::marker::PhantomData;

use bytes::Bytes;
use callsocket::{DeserializeError, Decoder, Encoder};

/// Length-delimited protocol buffers encoder.
#[derive(Debug)]
pub struct ProstEncoder<T> {
    _phantom: PhantomData<fn(T)>,
}

impl<T> Default for ProstEncoder<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Encoder for ProstEncoder<T>
where
    T: prost::Message,
{
    type Message = T;
    type Serialized = Bytes;

    fn encode(&mut self, message: Self::Message) -> Self::Serialized {
        let buffer = message.encode_length_delimited_to_vec();
        log::trace!("encoded {}b", buffer.len());
        buffer.into()
    }
}

/// Length-delimited protocol buffers decoder.
#[derive(Debug)]
pub struct ProstDecoder<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for ProstDecoder<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Decoder for ProstDecoder<T>
where
    T: prost::Message + Default,
{
    type Message = T;

    fn decode(
        &mut self,
        mut buffer: impl bytes::Buf,
    ) -> std::result::Result<(usize, Self::Message), DeserializeError> {
        match prost::decode_length_delimiter(buffer.chunk()) {
            Ok(message_length) => {
                if buffer.remaining() < message_length + prost::length_delimiter_len(message_length)
                {
                    return Err(DeserializeError::IncompleteBuffer {
                        next_message_size: message_length,
                    });
                }
            }
            Err(e) => {
                if 10 <= buffer.remaining() {
                    log::warn!("invalid length delimiter: {e:?}");
                    return Err(DeserializeError::InvalidBuffer);
                }
                log::trace!("can't read a length delimiter {e:?}");
                return Err(DeserializeError::IncompleteBuffer {
                    next_message_size: 10,
                });
            }
        };

        let start = buffer.remaining();
        match T::decode_length_delimited(&mut buffer) {
            Ok(message) => {
                let length = start - buffer.remaining();
                log::trace!("decoded {length}b");
                Ok((length, message))
            }
            Err(e) => {
                log::warn!("could not decode message: {e:?}");
                Err(DeserializeError::InvalidBuffer)
            }
        }
    }
}

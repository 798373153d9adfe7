//! Protocol module containing frame types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ProtocolError,
};
pub use messages::*;

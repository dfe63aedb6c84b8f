//! Webcraft wire protocol: packet envelope, command ids, batch framing and
//! chunk payload types shared by the server and the client.

pub mod batch;
pub mod codec;
pub mod compression;
pub mod error;
pub mod packets;
pub mod types;

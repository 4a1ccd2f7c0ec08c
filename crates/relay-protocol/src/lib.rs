//! Wire protocol for the relay bridge client: the [`envelope::Envelope`]
//! types exchanged with a project daemon, and the length-prefixed streaming
//! [`codec`] that frames them over a byte stream.

pub mod codec;
pub mod envelope;

pub use codec::{CodecError, FrameParser};
pub use envelope::{Envelope, EnvelopeBody};

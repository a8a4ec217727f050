//! MIME assembly: the content tree and the encodings used to serialize it.

pub mod encoding;
pub mod part;

pub mod deserializer;
pub mod message;
pub mod serializer;

/// Upper bound on a declared frame body, checked before any body byte is read.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

// name_len + lastname_len + document + birth date + number, with empty names
const MIN_BET_RECORD_LEN: usize = 5 * 4;

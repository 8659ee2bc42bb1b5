// Core modules implementing the record format, conversion, and error modeling.
pub mod encode;
pub mod error;
pub mod format;
pub mod record;
pub mod verify;

//! Persistence of fitted models.
//!
//! Models are written as a single framed record behind a magic header, with
//! a CRC32 over the JSON payload. Writes go through a temporary file and a
//! rename so a crash never leaves a half-written model in place.

mod codec;
mod model_file;

pub use codec::{decode, encode, read_header, write_header, CODEC_VERSION, MAGIC};
pub use model_file::{load_model, save_model, ModelId, PersistedModel};

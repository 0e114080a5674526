pub mod decode;
pub mod sigs;

pub use self::decode::{BodyDecoder, DecoderRegistry};
pub use self::sigs::{ScanOutcome, SignatureCatalog};

//! Decoder Adapter - symphonia 音频解码

mod symphonia_decoder;

pub use symphonia_decoder::{encode_wav, SymphoniaDecoder};

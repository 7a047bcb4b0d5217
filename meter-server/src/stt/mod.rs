//! Speech-to-text collaborators implementing [`meter_core::SpeechToText`].

mod whisper;

pub use whisper::WhisperTranscriber;

//! Chunked verification of claims against document text.

pub mod aggregate;
pub mod chunker;
pub mod client;
pub mod parse;
pub mod prompts;
pub mod synthesize;
pub mod types;

pub use aggregate::ChunkAggregator;
pub use client::VerifierClient;
pub use synthesize::EvidenceSynthesizer;

//! Agent Host - the chat core between the UI driver and the model
//!
//! This crate provides:
//! - The `<think>` token filter and the response assembler built on it
//! - Prompt / request construction for single-shot and history-aware modes
//! - The session controller that commits exchanges and persists the store

pub mod assembler;
pub mod prompts;
pub mod session;
pub mod think_filter;

pub use assembler::{assemble_once, assemble_streaming, NoopObserver, ResponseAssembler, StreamObserver};
pub use session::{SessionContext, SessionController, SubmitOutcome};
pub use think_filter::{filter, MaskingState};

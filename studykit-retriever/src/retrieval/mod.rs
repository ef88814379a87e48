//! Retrieval on top of the context store.
//!
//! - [`assembler`]: joins retrieved units into prompt-ready context
//! - [`session`]: the [`StudySession`](session::StudySession) that ingests
//!   documents and answers queries

pub mod assembler;
pub mod session;

pub use assembler::{ContextAssembler, UNIT_SEPARATOR};
pub use session::{IngestReport, StudySession};

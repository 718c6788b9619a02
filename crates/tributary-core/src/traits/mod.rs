pub mod dead_letter;
pub mod document;
pub mod graph;
pub mod stream;

pub use dead_letter::{DeadLetter, DeadLetterSink};
pub use document::DocumentStore;
pub use graph::GraphStore;
pub use stream::ChangeStream;

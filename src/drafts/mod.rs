//! Draft replies: the editable draft model and the reply generator.

pub mod generator;
pub mod model;

pub use generator::{GeneratedReply, GeneratorConfig, ReplyGenerator};
pub use model::Draft;

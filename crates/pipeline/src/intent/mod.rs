pub mod classifier;
pub mod handlers;

pub use classifier::IntentClassifier;
pub use handlers::{dispatch_intent_handler, HandlerResult};

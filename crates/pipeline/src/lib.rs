//! Intent classification, heuristic routing, hybrid retrieval orchestration,
//! and self-correcting grounded generation, composed into one query pipeline.

pub mod error;
pub mod events;
pub mod intent;
pub mod orchestrator;
pub mod router;
pub mod rewrite;
pub mod verify;

pub use error::{PipelineError, Result};
pub use events::{Phase, StreamEvent};
pub use intent::{dispatch_intent_handler, HandlerResult, IntentClassifier};
pub use orchestrator::{Pipeline, PipelineDependencies, QueryOutcome};
pub use router::{route_query, RouteResult};
pub use rewrite::QueryRewriter;
pub use verify::{fast_check, GroundednessVerifier, VerificationResult};

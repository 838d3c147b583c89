pub mod mining;
pub mod pipeline;
pub mod registry;
pub mod routing;
pub mod session;

pub use mining::MiningQueue;
pub use pipeline::{ContentCycleJob, Pipeline, PollJob};
pub use registry::{normalize_hook, IdeaRegistry};
pub use routing::{parse_command, route, Command, DraftTarget, Route, RoutingSnapshot};
pub use session::SessionBook;

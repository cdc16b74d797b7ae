pub mod controller;
pub mod request;
pub mod result;
pub mod state;
pub mod view;

pub use controller::SessionController;
pub use request::{AnalysisRequest, ExplorationRequest, SessionRequest};
pub use result::{export_actions_json, ResultSummary, SessionResult};
pub use state::{Effect, Session, SessionEvent, SessionState};
pub use view::{ActionRow, SessionObserver, SessionView};

pub mod bootstrap;
pub mod budget;
pub mod context;
pub mod lifecycle;
pub mod refresh;
pub mod session;

pub use bootstrap::{bootstrap, Application, BootstrapError};
pub use budget::BudgetService;
pub use context::{ActionContext, MemoryBackend, ServiceContext};
pub use lifecycle::{Confirmation, LifecycleHandler, TransitionOutcome, TransitionReceipt};
pub use refresh::{RefreshBus, RefreshEvent};
pub use session::{AuthService, Session, SessionError, SessionStore};

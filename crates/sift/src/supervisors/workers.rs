//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the
//! credit in the sprint retro.
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use tokio::task::JoinHandle;

mod query_worker;
mod row_decoder;

pub(crate) use query_worker::QueryWorker;
pub(crate) use row_decoder::RowDecoder;

/// 🏗️ A background worker, that does work. duh.
///
/// `start` spawns and hands back the handle. Whatever the worker learned comes back
/// through the handle; workers never write into shared state.
pub(crate) trait Worker {
    type Output: Send + 'static;

    fn start(self) -> JoinHandle<Self::Output>;
}

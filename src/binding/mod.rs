//! Binding cache entries to reactive consumers.
//!
//! A consumer (a UI component, a request handler, a background job) calls
//! [`Binding::update`] with whatever reference it currently wants, as often
//! as it likes. The binding stabilizes the reference, so rebuilding an equal
//! reference is not a change, and only touches the cache when the reference
//! really changes. The latest [`BindingState`] is held in a
//! [`Signal`](crate::signal::Signal) that consumers can read or watch.
//!
//! Remote errors are recorded in the state and then handed to the host
//! through [`BindingOptions::error_sink`]; with no sink they are logged at
//! error level.

mod fetch;
mod live;
mod state;

pub use fetch::FetchOnce;
pub use live::Binding;
pub use state::{unwrap_snapshot, BindingState, Data};

use crate::error::{BindingError, RemoteError};
use crate::reference::SharedRef;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::error;

/// Options shared by [`Binding`] and [`FetchOnce`].
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    /// Caller label shown in diagnostic reports.
    pub label: Option<String>,
    /// Where remote errors are propagated once recorded in the state.
    pub error_sink: Option<UnboundedSender<BindingError>>,
}

impl BindingOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_error_sink(mut self, sink: UnboundedSender<BindingError>) -> Self {
        self.error_sink = Some(sink);
        self
    }
}

fn propagate<D: 'static>(
    sink: Option<&UnboundedSender<BindingError>>,
    reference: &SharedRef<D>,
    remote: RemoteError,
) {
    let err = BindingError::Remote {
        path: reference.path(),
        source: Arc::new(remote),
    };

    match sink {
        Some(sink) => {
            if let Err(unsent) = sink.send(err) {
                error!(error = %unsent.0, "binding error sink closed");
            }
        }
        None => error!(error = %err, "unhandled binding error"),
    }
}

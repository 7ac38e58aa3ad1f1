use crate::indexer::FileIndex;
use crate::model::{ControllerDescriptor, RouteDescriptor};
use crate::source::{BufferOverlay, SourceProvider};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

/// Sent to subscribers whenever a refresh changes the route identity sequence.
#[derive(Debug, Clone)]
pub struct RoutesChanged {
    pub routes: Arc<Vec<RouteDescriptor>>,
}

/// Current flattened view of every controller and route in the workspace.
///
/// Change detection compares the *ordered* `METHOD path` identity sequence,
/// so a pure reordering of the same routes is reported as a change.
pub struct RouteIndexStore<S = BufferOverlay> {
    index: FileIndex<S>,
    controllers: Arc<Vec<ControllerDescriptor>>,
    routes: Arc<Vec<RouteDescriptor>>,
    subscribers: Vec<Sender<RoutesChanged>>,
}

impl<S: SourceProvider> RouteIndexStore<S> {
    pub fn new(index: FileIndex<S>) -> Self {
        Self {
            index,
            controllers: Arc::new(Vec::new()),
            routes: Arc::new(Vec::new()),
            subscribers: Vec::new(),
        }
    }

    pub fn routes(&self) -> Arc<Vec<RouteDescriptor>> {
        Arc::clone(&self.routes)
    }

    pub fn controllers(&self) -> Arc<Vec<ControllerDescriptor>> {
        Arc::clone(&self.controllers)
    }

    pub fn index(&self) -> &FileIndex<S> {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut FileIndex<S> {
        &mut self.index
    }

    pub fn subscribe(&mut self) -> Receiver<RoutesChanged> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Rescans the workspace and replaces the snapshots. Returns whether the
    /// route identity sequence changed (and subscribers were notified).
    pub fn refresh(&mut self) -> bool {
        let result = self.index.scan_workspace();
        let before = identities(&self.routes);
        let after = identities(&result.routes);
        self.routes = Arc::new(result.routes);
        self.controllers = Arc::new(result.controllers);
        if before == after {
            tracing::debug!(routes = after.len(), "route set unchanged");
            return false;
        }
        tracing::info!(
            before = before.len(),
            after = after.len(),
            "route set changed"
        );
        let event = RoutesChanged {
            routes: Arc::clone(&self.routes),
        };
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        true
    }
}

fn identities(routes: &[RouteDescriptor]) -> Vec<String> {
    routes.iter().map(RouteDescriptor::identity).collect()
}

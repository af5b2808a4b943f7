// src/location/testing.rs
//! Hand-driven platform for unit tests

use super::{FixSink, LocationPlatform, PositionError, WatchId, WatchOptions};
use crate::gps::RawFix;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

#[derive(Default)]
struct ManualState {
    sinks: HashMap<WatchId, FixSink>,
    opened: usize,
    next: u64,
    refuse: Option<PositionError>,
}

/// Clones share state, so a test can keep a handle while the tracker owns one
#[derive(Clone, Default)]
pub(crate) struct ManualPlatform {
    state: Arc<Mutex<ManualState>>,
}

impl ManualPlatform {
    pub(crate) fn push(&self, fix: RawFix) {
        let state = self.state.lock().unwrap();
        for sink in state.sinks.values() {
            let _ = sink.send(Ok(fix.clone()));
        }
    }

    pub(crate) fn push_error(&self, error: PositionError) {
        let state = self.state.lock().unwrap();
        for sink in state.sinks.values() {
            let _ = sink.send(Err(error.clone()));
        }
    }

    pub(crate) fn refuse_with(&self, error: PositionError) {
        self.state.lock().unwrap().refuse = Some(error);
    }

    pub(crate) fn open_watches(&self) -> usize {
        self.state.lock().unwrap().sinks.len()
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }
}

impl LocationPlatform for ManualPlatform {
    fn watch_position(
        &mut self,
        _options: &WatchOptions,
        sink: FixSink,
    ) -> std::result::Result<WatchId, PositionError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.refuse.clone() {
            return Err(error);
        }
        state.next += 1;
        state.opened += 1;
        let id = WatchId(state.next);
        state.sinks.insert(id, sink);
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.state.lock().unwrap().sinks.remove(&id);
    }
}

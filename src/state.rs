use crate::gate::RequestGate;

// app's shared state
pub struct AppState {
    pub gate: RequestGate,
}

impl AppState {
    pub fn new(gate: RequestGate) -> Self {
        Self { gate }
    }
}

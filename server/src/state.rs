use std::sync::Arc;

use crate::allocation::{AllocationCoordinator, AllocationSettings};
use crate::clock::Clock;
use crate::config::Config;
use crate::lifecycle::{LifecycleStateMachine, TransitionTable};
use crate::status::StatusTransitionService;
use crate::store::TicketStore;

/// Shared handler state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub allocation: Arc<AllocationCoordinator>,
    pub status: Arc<StatusTransitionService>,
}

impl AppState {
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let transitions = Arc::new(TransitionTable::standard());
        let machine = LifecycleStateMachine::new(transitions, Arc::clone(&clock));

        Self {
            allocation: Arc::new(AllocationCoordinator::new(
                Arc::clone(&store),
                clock,
                AllocationSettings::from(config),
            )),
            status: Arc::new(StatusTransitionService::new(
                Arc::clone(&store),
                machine,
                config.request_timeout,
            )),
            store,
        }
    }
}

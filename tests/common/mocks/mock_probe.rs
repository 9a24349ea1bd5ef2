use async_trait::async_trait;
use collector_sync::application::ports::ReachabilityProbe;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct ScriptedProbe {
    reachable: AtomicBool,
}

impl ScriptedProbe {
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

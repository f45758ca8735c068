use std::sync::Arc;

use conductor_agent::AgentProtocol;
use conductor_core::Conductor;

#[derive(Clone)]
pub struct AppState {
    pub conductor: Arc<Conductor>,
    pub agent: Arc<AgentProtocol>,
    pub auth_token: Arc<String>,
}

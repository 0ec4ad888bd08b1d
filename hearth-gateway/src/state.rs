use std::sync::Arc;

use crate::proxy::RouteTable;
use crate::session::SessionVerifier;

#[derive(Clone)]
pub struct GatewayState {
    pub verifier: Arc<SessionVerifier>,
    pub routes: Arc<RouteTable>,
    pub http: reqwest::Client,
}

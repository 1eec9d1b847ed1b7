//! Request-scoped state handed to every core operation.
//!
//! Nothing in the core reads ambient session or clock state; the router builds
//! one [`RequestContext`] per request and passes it down explicitly.

use chrono::{DateTime, Utc};

use crate::logging::Logger;

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub now: DateTime<Utc>,
    pub logger: Logger,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: String, now: DateTime<Utc>) -> Self {
        Self {
            now,
            logger: Logger::new(request_id),
            client_ip: None,
            user_agent: None,
            referrer: None,
        }
    }

    pub fn with_client(
        mut self,
        client_ip: Option<String>,
        user_agent: Option<String>,
        referrer: Option<String>,
    ) -> Self {
        self.client_ip = client_ip;
        self.user_agent = user_agent;
        self.referrer = referrer;
        self
    }

    pub fn request_id(&self) -> &str {
        self.logger.request_id()
    }
}

use serde::{Deserialize, Serialize};

/// Identity of the caller, resolved by the transport before classification
/// so permission decisions can depend on request-time authentication state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    /// False when no identity headers were sent
    #[serde(default)]
    pub authenticated: bool,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: None,
            user_name: None,
            authenticated: true,
        }
    }

    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
            authenticated: true,
        }
    }

    /// Caller that presented no identity.
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            user_email: None,
            user_name: None,
            authenticated: false,
        }
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

use crate::params::Params;
use std::fmt::{self, Display, Formatter};
use url::Url;

pub const BEAR_SCHEME: &str = "bear";
const CALLBACK_HOST: &str = "x-callback-url";
pub const CALLBACK_PARAM_KEY_SOURCE: &str = "x-source";
pub const CALLBACK_PARAM_KEY_SUCCESS: &str = "x-success";
pub const CALLBACK_PARAM_KEY_ERROR: &str = "x-error";

/// Builds the Bear request URL for `action`.
pub fn build_url(action: &str, params: &Params) -> String {
    XCallbackUrl::with_params(BEAR_SCHEME, action, params.clone()).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XCallbackUrl {
    scheme: String,
    action: String,
    params: Params,
}

impl XCallbackUrl {
    pub fn new(scheme: &str) -> Self {
        XCallbackUrl {
            scheme: scheme.to_string(),
            action: "".to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(scheme: &str, action: &str, params: Params) -> Self {
        let mut url = XCallbackUrl::new(scheme);
        url.set_action(action);
        url.params = params;
        url
    }

    /// Leading path separators are dropped so `/open-note` and `open-note` agree.
    pub fn set_action<T: AsRef<str>>(&mut self, action: T) {
        self.action = action.as_ref().trim_start_matches('/').to_string();
    }

    /// Routes the completion callbacks of this request to the given endpoints.
    pub fn set_callback(&mut self, success: &str, error: &str, source: &str) {
        self.params.set(CALLBACK_PARAM_KEY_SUCCESS, success);
        self.params.set(CALLBACK_PARAM_KEY_ERROR, error);
        self.params.set(CALLBACK_PARAM_KEY_SOURCE, source);
    }
}

impl Display for XCallbackUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Path escaping leaves `/`, `+` and `:` alone and turns spaces into `%20`.
        let mut base =
            Url::parse(&format!("{}://{}", self.scheme, CALLBACK_HOST)).map_err(|_| fmt::Error)?;
        base.set_path(&format!("/{}", self.action));
        write!(f, "{}", base)?;
        if !self.params.is_empty() {
            write!(f, "?{}", self.params.encode())?;
        }
        Ok(())
    }
}

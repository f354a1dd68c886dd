use std::fmt;

use tracing::debug;

use super::credentials::CredentialRecord;
use super::store::{SessionOptions, SessionStore};
use crate::api::{methods::ProfileMethod, ApiError, Endpoint, Params, PreparedCall, Request};

/// Fields requested by [`Session::info`].
pub const DEFAULT_INFO_FIELDS: &str =
    "nickname,screen_name,sex,bdate,has_mobile,online,last_seen,status,photo_100";

/// Live view of whichever user is current in a [`SessionStore`].
///
/// Nothing is cached: every accessor goes back to the store, so a session
/// handed out before `activate` reports the newly activated user afterwards.
/// Cloning is cheap and clones may be used from any thread.
#[derive(Clone)]
pub struct Session {
    store: SessionStore,
}

impl Session {
    pub(crate) fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn user_id(&self) -> Option<u64> {
        self.store.resolve_active().map(|(record, _)| record.user_id())
    }

    pub fn token(&self) -> Option<String> {
        self.store
            .resolve_active()
            .map(|(record, _)| record.token().to_string())
    }

    /// The full credential record of the current user.
    pub fn access_token(&self) -> Option<CredentialRecord> {
        self.store.resolve_active().map(|(record, _)| record)
    }

    /// Options of the current activation cycle, or the store defaults when
    /// nobody is current.
    pub fn options(&self) -> SessionOptions {
        self.store
            .resolve_active()
            .map(|(_, options)| options)
            .unwrap_or_else(|| self.store.defaults())
    }

    pub fn start_all_requests_immediately(&self) -> bool {
        self.options().start_all_requests_immediately
    }

    pub fn set_start_all_requests_immediately(&self, start: bool) {
        self.store
            .update_active_options(|o| o.start_all_requests_immediately = start);
    }

    pub fn offline_mode(&self) -> bool {
        self.options().offline_mode
    }

    pub fn set_offline_mode(&self, offline: bool) {
        if self.store.update_active_options(|o| o.offline_mode = offline) {
            debug!(offline, "Offline mode changed");
        }
    }

    /// Stamp `params` with the current user's token. A caller-supplied
    /// `access_token` is always overwritten.
    pub fn inject_token(&self, params: Params) -> Result<Params, ApiError> {
        let token = self.token().ok_or(ApiError::NoActiveSession)?;
        Ok(params.with_token(&token))
    }

    /// Build a request for `endpoint` on behalf of the current user.
    ///
    /// With `start_all_requests_immediately` set the request is already
    /// running when returned; otherwise it is dormant until
    /// [`Request::start`].
    pub fn request(
        &self,
        endpoint: impl Into<Endpoint>,
        params: Params,
    ) -> Result<Request, ApiError> {
        let (record, options) = self
            .store
            .resolve_active()
            .ok_or(ApiError::NoActiveSession)?;
        let client = self.store.client().cloned().ok_or(ApiError::NoClient)?;

        let call = PreparedCall::new(
            record.user_id(),
            endpoint.into(),
            params.with_token(record.token()),
            options.offline_mode,
        );
        let mut request = Request::new(call, client);
        if options.start_all_requests_immediately {
            request.start()?;
        }
        Ok(request)
    }

    /// Profile of the current user with the default field set.
    pub fn info(&self) -> Result<Request, ApiError> {
        let params = Params::new().with("fields", DEFAULT_INFO_FIELDS);
        self.request(ProfileMethod::Get, params)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.store.resolve_active() {
            Some((record, options)) => write!(
                f,
                "Session(user_id={}, start_immediately={}, offline_mode={})",
                record.user_id(),
                options.start_all_requests_immediately,
                options.offline_mode
            ),
            None => write!(f, "Session(no active user)"),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

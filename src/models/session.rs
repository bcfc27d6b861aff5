use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct UserMetadata {
    #[serde(default)]
    pub username: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub about: String,
}

impl UserMetadata {
    /// A profile is complete once username, full name and image are set.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty()
            && !self.full_name.trim().is_empty()
            && !self.image.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub metadata: UserMetadata,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user: User {
                id: user_id.into(),
                email: None,
                metadata: UserMetadata::default(),
            },
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Events reported by the identity provider.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    UserUpdated,
    TokenRefreshed,
}

pub type SessionChange = (AuthEvent, Option<Session>);

/// Where the calling layer should take the user. The state machine only
/// suggests it; navigation belongs to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Splash,
    Login,
    CompleteProfile,
    Feed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Loading,
    Unauthenticated,
    IncompleteProfile(Session),
    Authenticated(Session),
}

impl AuthState {
    fn from_session(session: Option<Session>) -> Self {
        match session {
            None => AuthState::Unauthenticated,
            Some(session) if session.user.metadata.is_complete() => AuthState::Authenticated(session),
            Some(session) => AuthState::IncompleteProfile(session),
        }
    }

    pub fn apply(&mut self, event: AuthEvent, session: Option<Session>) {
        let next = match event {
            AuthEvent::SignedOut => AuthState::Unauthenticated,
            _ => AuthState::from_session(session),
        };
        if next != *self {
            log::info!("auth state {:?} -> {:?} on {:?}", self.route(), next.route(), event);
        }
        *self = next;
    }

    /// The session gating mutations and subscriptions. An incomplete
    /// profile still has a user id, so actions are allowed.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::IncompleteProfile(session) | AuthState::Authenticated(session) => Some(session),
            AuthState::Loading | AuthState::Unauthenticated => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn route(&self) -> Route {
        match self {
            AuthState::Loading => Route::Splash,
            AuthState::Unauthenticated => Route::Login,
            AuthState::IncompleteProfile(_) => Route::CompleteProfile,
            AuthState::Authenticated(_) => Route::Feed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_session() -> Session {
        let mut session = Session::new("u-1");
        session.user.metadata = UserMetadata {
            username: "ana".into(),
            full_name: "Ana Lima".into(),
            image: "https://img/ana.png".into(),
            about: String::new(),
        };
        session
    }

    #[test]
    fn starts_loading_without_session() {
        let state = AuthState::default();
        assert!(state.is_loading());
        assert_eq!(state.session(), None);
        assert_eq!(state.route(), Route::Splash);
    }

    #[test]
    fn sign_in_with_incomplete_profile_asks_for_profile() {
        let mut state = AuthState::default();
        state.apply(AuthEvent::SignedIn, Some(Session::new("u-1")));
        assert_eq!(state.route(), Route::CompleteProfile);
        assert_eq!(state.session().map(Session::user_id), Some("u-1"));
    }

    #[test]
    fn user_updated_completes_profile() {
        let mut state = AuthState::default();
        state.apply(AuthEvent::InitialSession, Some(Session::new("u-1")));
        state.apply(AuthEvent::UserUpdated, Some(complete_session()));
        assert_eq!(state.route(), Route::Feed);
    }

    #[test]
    fn signed_out_drops_session_even_if_one_is_passed() {
        let mut state = AuthState::default();
        state.apply(AuthEvent::SignedIn, Some(complete_session()));
        state.apply(AuthEvent::SignedOut, Some(complete_session()));
        assert_eq!(state, AuthState::Unauthenticated);
        assert_eq!(state.route(), Route::Login);
    }

    #[test]
    fn missing_session_is_unauthenticated() {
        let mut state = AuthState::default();
        state.apply(AuthEvent::InitialSession, None);
        assert_eq!(state.route(), Route::Login);
    }
}

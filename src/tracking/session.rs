//! AR session lifecycle and asynchronous platform requests
//!
//! A session is an explicit value owned by the caller; nothing here is global.
//! Every start issues a fresh token. Requests remember the token they were
//! made under, and a resolution that arrives after its session ended is
//! dropped instead of applied.

use crate::config::{DepthFormat, DepthUsage, SessionConfig, XrFeature};
use crate::error::{EngineError, EngineResult};
use futures::channel::oneshot;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of one started session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub u64);

/// Features the host platform can provide
#[derive(Debug, Clone, Default)]
pub struct PlatformCapabilities {
    pub supported: FxHashSet<XrFeature>,
}

impl PlatformCapabilities {
    pub fn with(features: &[XrFeature]) -> Self {
        Self {
            supported: features.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct XrSession {
    pub token: Option<SessionToken>,
    pub enabled_features: FxHashSet<XrFeature>,
    /// Depth preferences negotiated at start, set only with depth sensing enabled
    pub depth_preferences: Option<(DepthUsage, DepthFormat)>,
    pub frame_count: u64,
}

pub fn create_session() -> XrSession {
    XrSession::default()
}

/// Start a session, enabling required features and whichever optional ones the
/// platform supports. A missing required feature fails the start; the session
/// stays inactive and starting can be retried.
pub fn start_session(
    session: &mut XrSession,
    config: &SessionConfig,
    capabilities: &PlatformCapabilities,
) -> EngineResult<SessionToken> {
    if session.token.is_some() {
        return Err(EngineError::SessionStartFailed {
            reason: "a session is already running".to_string(),
        });
    }

    let missing: Vec<&str> = config
        .required_features
        .iter()
        .filter(|feature| !capabilities.supported.contains(feature))
        .map(|feature| feature.name())
        .collect();
    if !missing.is_empty() {
        log::error!(
            "[session::start_session] Required features unsupported: {}",
            missing.join(", ")
        );
        return Err(EngineError::SessionStartFailed {
            reason: format!("unsupported required features: {}", missing.join(", ")),
        });
    }

    let mut enabled: FxHashSet<XrFeature> = config.required_features.iter().copied().collect();
    for feature in &config.optional_features {
        if capabilities.supported.contains(feature) {
            enabled.insert(*feature);
        } else {
            log::info!(
                "[session::start_session] Optional feature {} unavailable",
                feature.name()
            );
        }
    }

    let depth_preferences = if enabled.contains(&XrFeature::DepthSensing) {
        if config.depth_format != DepthFormat::LuminanceAlpha {
            return Err(EngineError::SessionStartFailed {
                reason: format!("depth format {:?} cannot be decoded", config.depth_format),
            });
        }
        log::info!(
            "[session::start_session] Depth sensing as {:?} / {:?}",
            config.depth_usage,
            config.depth_format
        );
        Some((config.depth_usage, config.depth_format))
    } else {
        None
    };

    let token = SessionToken(NEXT_SESSION_TOKEN.fetch_add(1, Ordering::Relaxed));
    session.token = Some(token);
    session.enabled_features = enabled;
    session.depth_preferences = depth_preferences;
    session.frame_count = 0;

    log::info!(
        "[session::start_session] Session {:?} started with {} features",
        token,
        session.enabled_features.len()
    );
    Ok(token)
}

/// End the session. Requests made under its token become stale.
pub fn end_session(session: &mut XrSession) {
    if let Some(token) = session.token.take() {
        log::info!(
            "[session::end_session] Session {:?} ended after {} frames",
            token,
            session.frame_count
        );
    }
    session.enabled_features.clear();
    session.depth_preferences = None;
}

pub fn is_feature_enabled(session: &XrSession, feature: XrFeature) -> bool {
    session.token.is_some() && session.enabled_features.contains(&feature)
}

/// Precondition check for features that must be enabled in the session config
pub fn require_feature(session: &XrSession, feature: XrFeature) -> EngineResult<()> {
    if session.token.is_none() {
        return Err(EngineError::SessionNotActive);
    }
    if !session.enabled_features.contains(&feature) {
        return Err(EngineError::FeatureDisabled(format!(
            "{} was not enabled in the session configuration",
            feature.name()
        )));
    }
    Ok(())
}

// ============================================================================
// ASYNC REQUESTS
// ============================================================================

/// Sending half of a platform request, completed by the host when it resolves
pub struct RequestResolver<T> {
    pub token: SessionToken,
    sender: oneshot::Sender<EngineResult<T>>,
}

impl<T> RequestResolver<T> {
    /// Deliver the result; ignored if the requester already gave up
    pub fn resolve(self, result: EngineResult<T>) {
        let _ = self.sender.send(result);
    }
}

/// Receiving half of a platform request, polled once per frame
pub struct PendingRequest<T> {
    pub token: SessionToken,
    receiver: oneshot::Receiver<EngineResult<T>>,
}

/// Outcome of polling a pending request
#[derive(Debug)]
pub enum RequestPoll<T> {
    /// Not resolved yet; keep the request
    Pending,
    Ready(T),
    Failed(EngineError),
    /// Resolved (or still pending) for a session that has ended
    Stale,
    /// The host dropped the resolver without answering
    Cancelled,
}

/// Create a request bound to the session's current token
pub fn create_request<T>(session: &XrSession) -> EngineResult<(RequestResolver<T>, PendingRequest<T>)> {
    let token = session.token.ok_or(EngineError::SessionNotActive)?;
    let (sender, receiver) = oneshot::channel();
    Ok((
        RequestResolver { token, sender },
        PendingRequest { token, receiver },
    ))
}

/// Check a pending request without blocking
pub fn poll_request<T>(session: &XrSession, request: &mut PendingRequest<T>) -> RequestPoll<T> {
    if session.token != Some(request.token) {
        return RequestPoll::Stale;
    }
    match request.receiver.try_recv() {
        Ok(None) => RequestPoll::Pending,
        Ok(Some(Ok(value))) => RequestPoll::Ready(value),
        Ok(Some(Err(error))) => RequestPoll::Failed(error),
        Err(oneshot::Canceled) => RequestPoll::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities() -> PlatformCapabilities {
        PlatformCapabilities::with(&[XrFeature::HitTest, XrFeature::DepthSensing])
    }

    #[test]
    fn test_start_enables_supported_features() {
        let mut session = create_session();
        let config = SessionConfig::default();
        start_session(&mut session, &config, &capabilities()).expect("start");

        assert!(is_feature_enabled(&session, XrFeature::HitTest));
        assert!(is_feature_enabled(&session, XrFeature::DepthSensing));
        assert!(!is_feature_enabled(&session, XrFeature::PlaneDetection));
    }

    #[test]
    fn test_missing_required_feature_fails_start_and_can_retry() {
        let mut session = create_session();
        let config = SessionConfig {
            required_features: vec![XrFeature::PlaneDetection],
            optional_features: vec![],
            ..SessionConfig::default()
        };

        let result = start_session(&mut session, &config, &capabilities());
        assert!(matches!(result, Err(EngineError::SessionStartFailed { .. })));
        assert!(session.token.is_none());

        let supported = PlatformCapabilities::with(&[XrFeature::PlaneDetection]);
        assert!(start_session(&mut session, &config, &supported).is_ok());
    }

    #[test]
    fn test_depth_preferences_follow_depth_sensing() {
        let mut session = create_session();
        let config = SessionConfig {
            depth_usage: DepthUsage::GpuOptimized,
            ..SessionConfig::default()
        };
        start_session(&mut session, &config, &capabilities()).expect("start");
        assert_eq!(
            session.depth_preferences,
            Some((DepthUsage::GpuOptimized, DepthFormat::LuminanceAlpha))
        );

        end_session(&mut session);
        assert!(session.depth_preferences.is_none());

        let no_depth = PlatformCapabilities::with(&[XrFeature::HitTest]);
        start_session(&mut session, &config, &no_depth).expect("start");
        assert!(session.depth_preferences.is_none());
    }

    #[test]
    fn test_undecodable_depth_format_fails_start() {
        let mut session = create_session();
        let config = SessionConfig {
            depth_format: DepthFormat::Float32,
            ..SessionConfig::default()
        };
        let result = start_session(&mut session, &config, &capabilities());
        assert!(matches!(result, Err(EngineError::SessionStartFailed { .. })));
        assert!(session.token.is_none());
    }

    #[test]
    fn test_require_feature_reports_disabled() {
        let mut session = create_session();
        assert!(matches!(
            require_feature(&session, XrFeature::HitTest),
            Err(EngineError::SessionNotActive)
        ));

        start_session(&mut session, &SessionConfig::default(), &capabilities()).expect("start");
        assert!(require_feature(&session, XrFeature::HitTest).is_ok());
        assert!(matches!(
            require_feature(&session, XrFeature::ImageTracking),
            Err(EngineError::FeatureDisabled(_))
        ));
    }

    #[test]
    fn test_request_resolves_within_session() {
        let mut session = create_session();
        start_session(&mut session, &SessionConfig::default(), &capabilities()).expect("start");

        let (resolver, mut pending) = create_request::<u32>(&session).expect("active session");
        assert!(matches!(poll_request(&session, &mut pending), RequestPoll::Pending));

        resolver.resolve(Ok(42));
        assert!(matches!(poll_request(&session, &mut pending), RequestPoll::Ready(42)));
    }

    #[test]
    fn test_resolution_after_session_end_is_stale() {
        let mut session = create_session();
        start_session(&mut session, &SessionConfig::default(), &capabilities()).expect("start");
        let (resolver, mut pending) = create_request::<u32>(&session).expect("active session");

        end_session(&mut session);
        start_session(&mut session, &SessionConfig::default(), &capabilities()).expect("restart");

        resolver.resolve(Ok(7));
        assert!(matches!(poll_request(&session, &mut pending), RequestPoll::Stale));
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut first = create_session();
        let mut second = create_session();
        let a = start_session(&mut first, &SessionConfig::default(), &capabilities()).expect("start");
        let b = start_session(&mut second, &SessionConfig::default(), &capabilities()).expect("start");
        assert_ne!(a, b);

        end_session(&mut first);
        assert!(second.token.is_some());
    }

    #[test]
    fn test_dropped_resolver_cancels() {
        let mut session = create_session();
        start_session(&mut session, &SessionConfig::default(), &capabilities()).expect("start");
        let (resolver, mut pending) = create_request::<u32>(&session).expect("active session");
        drop(resolver);
        assert!(matches!(poll_request(&session, &mut pending), RequestPoll::Cancelled));
    }
}

//! Hit-test synchronizer
//!
//! Requests a viewer-space hit-test source on the first frame of a session,
//! then moves the cursor onto the nearest hit each frame. The floor height
//! only ever moves down: the lowest surface seen so far anchors the floor.

use super::frame_input::{HitTestSource, XrFrameInput, XrPlatform};
use super::session::{
    create_request, is_feature_enabled, poll_request, PendingRequest, RequestPoll, SessionToken,
    XrSession,
};
use crate::config::XrFeature;
use crate::error::{EngineError, EngineResult};
use crate::scene::{set_node_transform, set_node_visible, NodeId, SceneGraph};

pub struct HitTestState {
    /// Session the source and request belong to
    pub session: Option<SessionToken>,
    pub source: Option<HitTestSource>,
    pub pending: Option<PendingRequest<HitTestSource>>,
    pub requested: bool,
    /// The platform rejected the request; no more attempts this session
    pub failed: bool,
    /// Lowest hit height observed, None until the first hit
    pub floor_height: Option<f32>,
    pub cursor: NodeId,
    pub cursor_visible: bool,
}

pub fn create_hit_test_state(cursor: NodeId) -> HitTestState {
    HitTestState {
        session: None,
        source: None,
        pending: None,
        requested: false,
        failed: false,
        floor_height: None,
        cursor,
        cursor_visible: false,
    }
}

/// Forget the source and request flag so the next session asks again
pub fn reset_hit_test(state: &mut HitTestState) {
    state.source = None;
    state.pending = None;
    state.requested = false;
    state.failed = false;
    state.cursor_visible = false;
}

/// Lower the floor to `y` if it is below the current floor
pub fn ratchet_floor(floor: Option<f32>, y: f32) -> f32 {
    match floor {
        Some(current) => current.min(y),
        None => y,
    }
}

/// Per-frame hit-test step.
///
/// A rejected source request is reported once; later frames treat hit-testing
/// as unavailable.
pub fn update_hit_test(
    state: &mut HitTestState,
    session: &XrSession,
    platform: &mut dyn XrPlatform,
    frame: &XrFrameInput,
    scene: &mut SceneGraph,
) -> EngineResult<()> {
    // Nothing carries over from an earlier session
    if state.session != session.token {
        reset_hit_test(state);
        set_node_visible(scene, state.cursor, false);
        state.session = session.token;
    }

    if !is_feature_enabled(session, XrFeature::HitTest) {
        return Ok(());
    }

    if !state.requested {
        let (resolver, pending) = create_request(session)?;
        platform.request_hit_test_source(resolver);
        state.pending = Some(pending);
        state.requested = true;
        log::debug!("[hit_test::update_hit_test] Requested viewer hit-test source");
    }

    if let Some(pending) = state.pending.as_mut() {
        match poll_request(session, pending) {
            RequestPoll::Pending => {}
            RequestPoll::Ready(source) => {
                log::debug!("[hit_test::update_hit_test] Hit-test source {:?} ready", source);
                state.source = Some(source);
                state.pending = None;
            }
            RequestPoll::Failed(error) => {
                state.pending = None;
                state.failed = true;
                log::error!("[hit_test::update_hit_test] Hit-test source rejected: {}", error);
                return Err(EngineError::SessionStartFailed {
                    reason: format!("hit-test source rejected: {}", error),
                });
            }
            RequestPoll::Stale | RequestPoll::Cancelled => {
                log::warn!("[hit_test::update_hit_test] Dropping unresolved hit-test request");
                state.pending = None;
                state.requested = false;
            }
        }
    }

    let Some(source) = state.source else {
        return Ok(());
    };

    match frame.hit_test_results_for(source).first() {
        Some(hit) => {
            set_node_transform(scene, state.cursor, hit.pose.transform);
            set_node_visible(scene, state.cursor, true);
            state.cursor_visible = true;
            state.floor_height = Some(ratchet_floor(state.floor_height, hit.pose.position().y));
        }
        None => {
            set_node_visible(scene, state.cursor, false);
            state.cursor_visible = false;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::scene::{attach_node, create_scene_graph};
    use crate::tracking::frame_input::{HitTestResult, LightProbe, Pose};
    use crate::tracking::session::{
        create_session, end_session, start_session, PlatformCapabilities, RequestResolver,
    };
    use cgmath::{Matrix4, SquareMatrix, Vector3};

    #[derive(Default)]
    struct ManualPlatform {
        hit_test_requests: Vec<RequestResolver<HitTestSource>>,
    }

    impl XrPlatform for ManualPlatform {
        fn request_hit_test_source(&mut self, reply: RequestResolver<HitTestSource>) {
            self.hit_test_requests.push(reply);
        }

        fn request_light_probe(&mut self, _reply: RequestResolver<LightProbe>) {}
    }

    fn hit_at(y: f32) -> HitTestResult {
        HitTestResult {
            pose: Pose {
                transform: Matrix4::from_translation(Vector3::new(0.3, y, -1.0)),
            },
        }
    }

    fn frame_with_hits(source: HitTestSource, hits: Vec<HitTestResult>) -> XrFrameInput {
        XrFrameInput {
            hit_test_results: vec![(source, hits)],
            ..XrFrameInput::default()
        }
    }

    fn started_session() -> XrSession {
        let mut session = create_session();
        start_session(
            &mut session,
            &SessionConfig::default(),
            &PlatformCapabilities::with(&[XrFeature::HitTest]),
        )
        .expect("start");
        session
    }

    #[test]
    fn test_floor_only_moves_down() {
        let mut floor = None;
        let mut history = Vec::new();
        for y in [1.0, 0.5, 0.8, 0.2] {
            floor = Some(ratchet_floor(floor, y));
            history.push(floor.expect("set"));
        }
        assert_eq!(history, vec![1.0, 0.5, 0.5, 0.2]);
    }

    #[test]
    fn test_requests_once_and_tracks_cursor() {
        let session = started_session();
        let mut platform = ManualPlatform::default();
        let mut scene = create_scene_graph();
        let cursor = attach_node(&mut scene, Matrix4::identity(), None, None);
        let mut state = create_hit_test_state(cursor);
        let source = HitTestSource(3);

        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("first frame");
        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("second frame");
        assert_eq!(platform.hit_test_requests.len(), 1);
        assert!(state.source.is_none());

        platform.hit_test_requests.remove(0).resolve(Ok(source));

        for y in [1.0, 0.5, 0.8, 0.2] {
            let frame = frame_with_hits(source, vec![hit_at(y), hit_at(5.0)]);
            update_hit_test(&mut state, &session, &mut platform, &frame, &mut scene).expect("frame");
            assert!(scene.nodes[&cursor].visible);
            assert_eq!(scene.nodes[&cursor].transform.w.y, y);
        }
        assert_eq!(state.floor_height, Some(0.2));

        let empty = frame_with_hits(source, vec![]);
        update_hit_test(&mut state, &session, &mut platform, &empty, &mut scene).expect("frame");
        assert!(!scene.nodes[&cursor].visible);
        assert_eq!(state.floor_height, Some(0.2));
    }

    #[test]
    fn test_session_end_forces_new_request() {
        let mut session = started_session();
        let mut platform = ManualPlatform::default();
        let mut scene = create_scene_graph();
        let cursor = attach_node(&mut scene, Matrix4::identity(), None, None);
        let mut state = create_hit_test_state(cursor);

        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("frame");
        let stale = platform.hit_test_requests.remove(0);

        end_session(&mut session);
        reset_hit_test(&mut state);
        start_session(
            &mut session,
            &SessionConfig::default(),
            &PlatformCapabilities::with(&[XrFeature::HitTest]),
        )
        .expect("restart");

        // Late answer from the old session must not be applied
        stale.resolve(Ok(HitTestSource(1)));
        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("frame");
        assert_eq!(platform.hit_test_requests.len(), 1);
        assert!(state.source.is_none());

        platform.hit_test_requests.remove(0).resolve(Ok(HitTestSource(2)));
        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("frame");
        assert_eq!(state.source, Some(HitTestSource(2)));
    }

    #[test]
    fn test_new_session_drops_old_source() {
        let mut session = started_session();
        let mut platform = ManualPlatform::default();
        let mut scene = create_scene_graph();
        let cursor = attach_node(&mut scene, Matrix4::identity(), None, None);
        let mut state = create_hit_test_state(cursor);

        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("frame");
        platform.hit_test_requests.remove(0).resolve(Ok(HitTestSource(1)));
        let placed = frame_with_hits(HitTestSource(1), vec![hit_at(1.0)]);
        update_hit_test(&mut state, &session, &mut platform, &placed, &mut scene).expect("frame");
        assert_eq!(state.source, Some(HitTestSource(1)));
        assert!(scene.nodes[&cursor].visible);

        // Session ended without touching the hit-test state
        end_session(&mut session);
        start_session(
            &mut session,
            &SessionConfig::default(),
            &PlatformCapabilities::with(&[XrFeature::HitTest]),
        )
        .expect("restart");

        let old_hits = frame_with_hits(HitTestSource(1), vec![hit_at(0.4)]);
        update_hit_test(&mut state, &session, &mut platform, &old_hits, &mut scene).expect("frame");

        assert!(state.source.is_none());
        assert_eq!(platform.hit_test_requests.len(), 1);
        assert!(!scene.nodes[&cursor].visible);
        assert_eq!(scene.nodes[&cursor].transform.w.y, 1.0);
    }

    #[test]
    fn test_rejected_request_reported_once() {
        let session = started_session();
        let mut platform = ManualPlatform::default();
        let mut scene = create_scene_graph();
        let cursor = attach_node(&mut scene, Matrix4::identity(), None, None);
        let mut state = create_hit_test_state(cursor);

        update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene)
            .expect("frame");
        platform.hit_test_requests.remove(0).resolve(Err(EngineError::FeatureDisabled(
            "hit-test".to_string(),
        )));

        let result =
            update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene);
        assert!(matches!(result, Err(EngineError::SessionStartFailed { .. })));

        let again =
            update_hit_test(&mut state, &session, &mut platform, &XrFrameInput::default(), &mut scene);
        assert!(again.is_ok());
        assert!(platform.hit_test_requests.is_empty());
    }
}

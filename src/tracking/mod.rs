//! Tracking Module - real-world state synchronized each frame
//!
//! The session owns feature enablement and the token that async platform
//! requests are checked against. Each synchronizer is a state struct plus a
//! per-frame update function driven by `frame::update_frame`.

pub mod frame_input;
pub mod hit_test;
pub mod light_estimation;
pub mod plane_detection;
pub mod session;

pub use frame_input::{
    DetectedPlane, HitTestResult, HitTestSource, LightEstimate, LightProbe, PlaneHandle, Pose,
    ViewDepth, ViewId, XrFrameInput, XrPlatform,
};
pub use hit_test::{create_hit_test_state, ratchet_floor, reset_hit_test, update_hit_test, HitTestState};
pub use light_estimation::{
    create_light_estimation_state, directional_light_from_estimate, reset_light_estimation,
    update_light_estimation, AmbientProbe, DirectionalLight, LightEstimationState,
    LIGHT_DIRECTION_SCALE,
};
pub use plane_detection::{
    clear_planes, create_plane_tracker, triangulate_plane_polygon, update_planes, PlaneEvent,
    PlaneTrackerState, TrackedPlane,
};
pub use session::{
    create_request, create_session, end_session, is_feature_enabled, poll_request, require_feature,
    start_session, PendingRequest, PlatformCapabilities, RequestPoll, RequestResolver, SessionToken,
    XrSession,
};

//! Light estimation synchronizer
//!
//! Requests a light probe once per session and, whenever the platform has an
//! estimate, turns it into a directional light plus an ambient SH probe.

use super::frame_input::{LightEstimate, LightProbe, XrFrameInput, XrPlatform};
use super::session::{
    create_request, is_feature_enabled, poll_request, PendingRequest, RequestPoll, SessionToken,
    XrSession,
};
use crate::config::XrFeature;
use cgmath::Vector3;

/// Distance the directional light is placed along the estimated direction
pub const LIGHT_DIRECTION_SCALE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub position: Vector3<f32>,
    /// Normalized so the brightest channel is at most 1
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientProbe {
    pub spherical_harmonics: [[f32; 3]; 9],
}

pub struct LightEstimationState {
    /// Session the light request belongs to
    pub session: Option<SessionToken>,
    pub probe: Option<LightProbe>,
    pub pending: Option<PendingRequest<LightProbe>>,
    pub requested: bool,
    pub direction_scale: f32,
    pub directional_light: DirectionalLight,
    pub ambient_probe: AmbientProbe,
    /// An estimate has been applied at least once
    pub has_estimate: bool,
}

pub fn create_light_estimation_state(direction_scale: f32) -> LightEstimationState {
    LightEstimationState {
        session: None,
        probe: None,
        pending: None,
        requested: false,
        direction_scale,
        directional_light: DirectionalLight {
            position: Vector3::new(0.0, direction_scale, 0.0),
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        },
        ambient_probe: AmbientProbe {
            spherical_harmonics: [[0.0; 3]; 9],
        },
        has_estimate: false,
    }
}

pub fn reset_light_estimation(state: &mut LightEstimationState) {
    state.probe = None;
    state.pending = None;
    state.requested = false;
}

/// Directional light for an estimate: position along the light direction,
/// color divided by max(1, brightest channel)
pub fn directional_light_from_estimate(estimate: &LightEstimate, direction_scale: f32) -> DirectionalLight {
    let intensity = estimate.primary_light_intensity;
    let scalar = intensity.x.max(intensity.y).max(intensity.z).max(1.0);

    DirectionalLight {
        position: estimate.primary_light_direction * direction_scale,
        color: [intensity.x / scalar, intensity.y / scalar, intensity.z / scalar],
        intensity: scalar,
    }
}

/// Per-frame light step. Fire-and-forget: a failed probe request is logged and
/// the lights keep their last values.
pub fn update_light_estimation(
    state: &mut LightEstimationState,
    session: &XrSession,
    platform: &mut dyn XrPlatform,
    frame: &XrFrameInput,
) {
    // Nothing carries over from an earlier session
    if state.session != session.token {
        reset_light_estimation(state);
        state.session = session.token;
    }

    if !is_feature_enabled(session, XrFeature::LightEstimation) {
        return;
    }

    if !state.requested {
        match create_request(session) {
            Ok((resolver, pending)) => {
                platform.request_light_probe(resolver);
                state.pending = Some(pending);
                state.requested = true;
            }
            Err(error) => {
                log::warn!("[light_estimation::update_light_estimation] {}", error);
                return;
            }
        }
    }

    if let Some(pending) = state.pending.as_mut() {
        match poll_request(session, pending) {
            RequestPoll::Pending => {}
            RequestPoll::Ready(probe) => {
                log::debug!("[light_estimation::update_light_estimation] Light probe {:?} ready", probe);
                state.probe = Some(probe);
                state.pending = None;
            }
            RequestPoll::Failed(error) => {
                log::warn!(
                    "[light_estimation::update_light_estimation] Light probe request failed: {}",
                    error
                );
                state.pending = None;
            }
            RequestPoll::Stale | RequestPoll::Cancelled => {
                log::warn!("[light_estimation::update_light_estimation] Dropping unresolved light request");
                state.pending = None;
                state.requested = false;
            }
        }
    }

    let Some(probe) = state.probe else {
        return;
    };
    let Some(estimate) = frame.light_estimate_for(probe) else {
        return;
    };

    state.directional_light = directional_light_from_estimate(estimate, state.direction_scale);
    state.ambient_probe.spherical_harmonics = estimate.spherical_harmonics;
    state.has_estimate = true;
    log::trace!(
        "[light_estimation::update_light_estimation] Light at {:?}",
        state.directional_light.position
    );
}

//! Stereo pan law.
//!
//! Single-sided linear attenuation: the channel the image moves towards
//! stays at unity, the other is scaled down. Centre leaves both untouched.

/// Left and right gains for `pan` in `-1.0..=1.0`.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan > 0.0 {
        (1.0 - pan, 1.0)
    } else {
        (1.0, 1.0 + pan)
    }
}

/// Apply [`pan_gains`] to a stereo pair in place.
pub fn apply_pan(pan: f32, left: &mut [f32], right: &mut [f32]) {
    let (l, r) = pan_gains(pan);
    if l != 1.0 {
        left.iter_mut().for_each(|s| *s *= l);
    }
    if r != 1.0 {
        right.iter_mut().for_each(|s| *s *= r);
    }
}

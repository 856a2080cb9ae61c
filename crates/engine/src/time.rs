//! Mapping between absolute source time and edited playhead time.
//!
//! The edited timeline is the source video with every gap between kept clips
//! spliced out. Nothing is materialized; each query walks the clip list.

use crate::timeline::Clip;

/// Converts absolute source time (seconds) into edited playhead time.
///
/// Anything before the first clip is excised, so the first clip starts at
/// edited time zero. Times before it clamp to `0.0`, times inside a gap pin
/// to the end of the preceding clip, and times after the last clip continue
/// linearly. An empty clip list maps everything to `0.0`.
///
/// # Example
/// ```
/// use clip_engine::Clip;
/// use clip_engine::time::to_edited_time;
///
/// let clips = [Clip::new(0.0, 10.0), Clip::new(15.0, 20.0)];
/// assert_eq!(to_edited_time(17.0, &clips), 12.0);
/// assert_eq!(to_edited_time(30.0, &clips), 25.0);
/// ```
pub fn to_edited_time(absolute: f64, clips: &[Clip]) -> f64 {
    let Some(first) = clips.first() else {
        return 0.0;
    };

    let mut skipped = first.start;
    for pair in clips.windows(2) {
        let (previous, clip) = (pair[0], pair[1]);
        if clip.start > absolute {
            if absolute > previous.end {
                return (previous.end - skipped).max(0.0);
            }
            break;
        }
        skipped += clip.start - previous.end;
    }

    (absolute - skipped).max(0.0)
}

/// Converts edited playhead time back into absolute source time.
///
/// Edited times before zero map to the first clip start; times past the
/// edited duration continue linearly after the last clip end.
pub fn to_absolute_time(edited: f64, clips: &[Clip]) -> f64 {
    let Some(first) = clips.first() else {
        return 0.0;
    };
    if edited <= 0.0 {
        return first.start;
    }

    let mut offset = 0.0;
    for clip in clips {
        let length = clip.duration();
        if edited < offset + length {
            return clip.start + (edited - offset);
        }
        offset += length;
    }

    // `clips` is non-empty here.
    let last = clips[clips.len() - 1];
    last.end + (edited - offset)
}

/// Total length of the edited timeline.
pub fn edited_duration(clips: &[Clip]) -> f64 {
    clips.iter().map(Clip::duration).sum()
}

/// Returns the last keyframe at or before `absolute`, or the first keyframe
/// when `absolute` precedes all of them.
pub fn snap_to_keyframe(absolute: f64, keyframes: &[f64]) -> Option<f64> {
    let index = keyframes.partition_point(|keyframe| *keyframe <= absolute);
    match index {
        0 => keyframes.first().copied(),
        index => Some(keyframes[index - 1]),
    }
}

/// Forward distance from `b` to `a` on a circular domain of size `max`.
///
/// For `a`, `b` in `[0, max)` the result is in `[0, max)`, including when the
/// wrapped sum rounds up to `max`.
///
/// # Example
/// ```
/// use clip_engine::time::wrapped_diff;
///
/// assert_eq!(wrapped_diff(0.0, 9.0, 10.0), 1.0);
/// assert_eq!(wrapped_diff(7.0, 3.0, 10.0), 4.0);
/// ```
pub fn wrapped_diff(a: f64, b: f64, max: f64) -> f64 {
    let diff = a - b;
    if diff >= 0.0 {
        return diff;
    }

    let wrapped = max - b + a;
    if wrapped < max || !(max > 0.0 && max.is_finite()) {
        wrapped
    } else {
        // Largest float below a positive finite `max`.
        f64::from_bits(max.to_bits() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::{edited_duration, snap_to_keyframe, to_absolute_time, to_edited_time, wrapped_diff};
    use crate::timeline::Clip;

    fn two_clips() -> Vec<Clip> {
        vec![Clip::new(0.0, 10.0), Clip::new(15.0, 20.0)]
    }

    #[test]
    fn edited_time_skips_gaps_before_the_query() {
        let clips = two_clips();

        assert_eq!(to_edited_time(17.0, &clips), 12.0);
        assert_eq!(to_edited_time(3.0, &clips), 3.0);
        assert_eq!(to_edited_time(30.0, &clips), 25.0);
    }

    #[test]
    fn edited_time_is_zero_for_empty_clip_list() {
        assert_eq!(to_edited_time(42.0, &[]), 0.0);
        assert_eq!(to_absolute_time(42.0, &[]), 0.0);
    }

    #[test]
    fn edited_time_before_first_clip_clamps_to_zero() {
        let clips = vec![Clip::new(5.0, 10.0), Clip::new(12.0, 20.0)];

        assert_eq!(to_edited_time(0.0, &clips), 0.0);
        assert_eq!(to_edited_time(4.999, &clips), 0.0);
        assert_eq!(to_edited_time(5.0, &clips), 0.0);
        assert_eq!(to_edited_time(6.0, &clips), 1.0);
    }

    #[test]
    fn edited_time_inside_gap_pins_to_previous_clip_end() {
        let clips = two_clips();

        assert_eq!(to_edited_time(10.0, &clips), 10.0);
        assert_eq!(to_edited_time(12.5, &clips), 10.0);
        assert_eq!(to_edited_time(15.0, &clips), 10.0);
    }

    #[test]
    fn edited_time_inside_clip_subtracts_all_earlier_gaps() {
        let clips = vec![
            Clip::new(2.0, 4.0),
            Clip::new(6.0, 9.0),
            Clip::new(13.0, 14.0),
        ];

        // first start 2, gaps 2 and 4
        assert_eq!(to_edited_time(3.0, &clips), 1.0);
        assert_eq!(to_edited_time(7.5, &clips), 7.5 - 4.0);
        assert_eq!(to_edited_time(13.5, &clips), 13.5 - 8.0);
    }

    #[test]
    fn edited_time_is_monotonic() {
        let clips = vec![
            Clip::new(1.0, 3.0),
            Clip::new(4.5, 9.0),
            Clip::new(9.0, 11.0),
            Clip::new(20.0, 21.5),
        ];

        let mut previous = f64::NEG_INFINITY;
        for step in 0..=300 {
            let t = step as f64 * 0.1;
            let edited = to_edited_time(t, &clips);
            assert!(
                edited >= previous,
                "mapping regressed at t={t}: {edited} < {previous}"
            );
            previous = edited;
        }
    }

    #[test]
    fn absolute_time_inverts_edited_time_inside_clips() {
        let clips = vec![Clip::new(2.0, 4.0), Clip::new(6.0, 9.0)];

        for t in [2.5, 3.0, 6.0, 7.25, 8.5] {
            let edited = to_edited_time(t, &clips);
            assert_eq!(to_absolute_time(edited, &clips), t);
        }
        assert_eq!(to_absolute_time(-1.0, &clips), 2.0);
        assert_eq!(to_absolute_time(6.0, &clips), 10.0);
    }

    #[test]
    fn edited_duration_sums_clip_lengths() {
        assert_eq!(edited_duration(&two_clips()), 15.0);
        assert_eq!(edited_duration(&[]), 0.0);
    }

    #[test]
    fn snap_to_keyframe_picks_last_keyframe_not_after_time() {
        let keyframes = [0.0, 2.0, 4.0, 6.0];

        assert_eq!(snap_to_keyframe(3.9, &keyframes), Some(2.0));
        assert_eq!(snap_to_keyframe(4.0, &keyframes), Some(4.0));
        assert_eq!(snap_to_keyframe(100.0, &keyframes), Some(6.0));
        assert_eq!(snap_to_keyframe(-1.0, &keyframes), Some(0.0));
        assert_eq!(snap_to_keyframe(1.0, &[]), None);
    }

    #[test]
    fn wrapped_diff_wraps_negative_distance() {
        assert_eq!(wrapped_diff(0.0, 9.0, 10.0), 1.0);
        assert_eq!(wrapped_diff(4.0, 4.0, 10.0), 0.0);
        assert_eq!(wrapped_diff(2.0, 7.0, 10.0), 5.0);
    }

    #[test]
    fn wrapped_diff_stays_in_range_and_is_zero_only_on_equal_inputs() {
        let max = 12.0;
        for a in 0..12 {
            for b in 0..12 {
                let (a, b) = (a as f64, b as f64);
                let diff = wrapped_diff(a, b, max);
                assert!((0.0..max).contains(&diff), "{a} {b} -> {diff}");
                assert_eq!(diff == 0.0, a == b);
            }
        }
    }

    #[test]
    fn wrapped_diff_never_rounds_up_to_max() {
        let diff = wrapped_diff(0.0, 1e-17, 1.0);

        assert!(diff < 1.0);
        assert!(diff > 0.999_999_999);
    }
}

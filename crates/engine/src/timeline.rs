use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::time::{edited_duration, to_edited_time};
use crate::undo::{UndoItem, UndoLog};

/// A kept segment of the source video in absolute seconds.
///
/// Serialized as a `[start, end]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Clip {
    pub start: f64,
    pub end: f64,
}

impl Clip {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Returns true for finite bounds with `start < end`.
    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start < self.end
    }
}

impl From<[f64; 2]> for Clip {
    fn from([start, end]: [f64; 2]) -> Self {
        Self { start, end }
    }
}

impl From<Clip> for [f64; 2] {
    fn from(value: Clip) -> Self {
        [value.start, value.end]
    }
}

/// Editable list of kept clips plus the keyframes produced by the same run.
///
/// Clips are non-overlapping and sorted by start. Every edit after `load`
/// goes through the undo log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipTimeline {
    clips: Vec<Clip>,
    keyframes: Vec<f64>,
    input_duration: Option<f64>,
    undo: UndoLog,
}

impl ClipTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn keyframes(&self) -> &[f64] {
        &self.keyframes
    }

    pub fn input_duration(&self) -> Option<f64> {
        self.input_duration
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Maps absolute source time onto the edited playhead.
    pub fn edited_time(&self, absolute: f64) -> f64 {
        to_edited_time(absolute, &self.clips)
    }

    pub fn edited_duration(&self) -> f64 {
        edited_duration(&self.clips)
    }

    /// Replaces the whole timeline and discards edit history.
    ///
    /// # Example
    /// ```
    /// use clip_engine::{Clip, ClipTimeline};
    ///
    /// let mut timeline = ClipTimeline::new();
    /// timeline
    ///     .load(vec![Clip::new(0.0, 10.0)], vec![0.0, 5.0, 10.0], Some(12.0))
    ///     .expect("valid timeline");
    /// assert_eq!(timeline.edited_duration(), 10.0);
    /// ```
    pub fn load(
        &mut self,
        clips: Vec<Clip>,
        keyframes: Vec<f64>,
        input_duration: Option<f64>,
    ) -> Result<()> {
        validate_clips(&clips).map_err(|reason| EngineError::InvalidTimelineState { reason })?;
        validate_keyframes(&keyframes)
            .map_err(|reason| EngineError::InvalidTimelineState { reason })?;
        validate_input_duration(input_duration, &clips, &keyframes)
            .map_err(|reason| EngineError::InvalidTimelineState { reason })?;

        debug!(
            clip_count = clips.len(),
            keyframe_count = keyframes.len(),
            input_duration = ?input_duration,
            discarded_undo = self.undo.len(),
            "timeline loaded"
        );
        self.clips = clips;
        self.keyframes = keyframes;
        self.input_duration = input_duration;
        self.undo.clear();
        Ok(())
    }

    /// Removes one clip that is currently part of the timeline.
    ///
    /// Returns `InvalidTimelineState` and leaves the timeline untouched when
    /// `clip` is not a member.
    pub fn delete_clip(&mut self, clip: Clip) -> Result<()> {
        let Some(index) = self.clips.iter().position(|existing| *existing == clip) else {
            warn!(start = clip.start, end = clip.end, "delete rejected: clip not found");
            return Err(EngineError::InvalidTimelineState {
                reason: format!("clip [{}, {}] is not in the timeline", clip.start, clip.end),
            });
        };

        let removed = self.clips.remove(index);
        self.undo.push(UndoItem::Delete { clip: removed });
        debug!(
            index,
            start = removed.start,
            end = removed.end,
            clip_count = self.clips.len(),
            "clip deleted"
        );
        Ok(())
    }

    /// Installs a new clip list as one undoable edit.
    pub fn replace_all(&mut self, new_clips: Vec<Clip>) -> Result<()> {
        if let Err(reason) = validate_clips(&new_clips) {
            warn!(%reason, "replace rejected");
            return Err(EngineError::InvalidTimelineState { reason });
        }

        let old = std::mem::replace(&mut self.clips, new_clips.clone());
        debug!(
            old_count = old.len(),
            new_count = new_clips.len(),
            "clips replaced"
        );
        self.undo.push(UndoItem::ChangeClips {
            old,
            new: new_clips,
        });
        Ok(())
    }

    /// Reverts the most recent edit. Returns `None` when there is nothing to undo.
    ///
    /// # Example
    /// ```
    /// use clip_engine::{Clip, ClipTimeline};
    ///
    /// let mut timeline = ClipTimeline::new();
    /// timeline
    ///     .load(vec![Clip::new(0.0, 10.0), Clip::new(15.0, 20.0)], vec![], None)
    ///     .expect("valid timeline");
    /// timeline.delete_clip(Clip::new(15.0, 20.0)).expect("clip exists");
    /// timeline.undo();
    /// assert_eq!(timeline.clips(), &[Clip::new(0.0, 10.0), Clip::new(15.0, 20.0)]);
    /// ```
    pub fn undo(&mut self) -> Option<UndoItem> {
        let item = self.undo.pop()?;
        match &item {
            UndoItem::Delete { clip } => {
                let index = self
                    .clips
                    .partition_point(|existing| existing.start < clip.start);
                self.clips.insert(index, *clip);
                debug!(index, start = clip.start, end = clip.end, "delete undone");
            }
            UndoItem::ChangeClips { old, .. } => {
                self.clips = old.clone();
                debug!(clip_count = self.clips.len(), "change undone");
            }
        }
        Some(item)
    }
}

/// Checks that clips are well formed, sorted by start and non-overlapping.
pub(crate) fn validate_clips(clips: &[Clip]) -> std::result::Result<(), String> {
    if let Some((index, clip)) = clips
        .iter()
        .enumerate()
        .find(|(_, clip)| !clip.is_well_formed())
    {
        return Err(format!(
            "clip {index} [{}, {}] must have finite bounds with start < end",
            clip.start, clip.end
        ));
    }

    if let Some(index) = clips
        .windows(2)
        .position(|pair| pair[0].end > pair[1].start)
    {
        return Err(format!(
            "clip {} overlaps or precedes clip {index}",
            index + 1
        ));
    }

    Ok(())
}

pub(crate) fn validate_keyframes(keyframes: &[f64]) -> std::result::Result<(), String> {
    if keyframes.iter().any(|keyframe| !keyframe.is_finite()) {
        return Err(String::from("keyframes must be finite"));
    }
    if let Some(index) = keyframes.windows(2).position(|pair| pair[0] > pair[1]) {
        return Err(format!("keyframe {} decreases", index + 1));
    }
    Ok(())
}

fn validate_input_duration(
    input_duration: Option<f64>,
    clips: &[Clip],
    keyframes: &[f64],
) -> std::result::Result<(), String> {
    let Some(duration) = input_duration else {
        return Ok(());
    };
    if !duration.is_finite() || duration < 0.0 {
        return Err(format!("input duration {duration} is not a valid length"));
    }

    let last_clip_end = clips.last().map(|clip| clip.end).unwrap_or(0.0);
    let last_keyframe = keyframes.last().copied().unwrap_or(0.0);
    if duration < last_clip_end || duration < last_keyframe {
        return Err(format!(
            "input duration {duration} ends before the last clip or keyframe"
        ));
    }
    Ok(())
}

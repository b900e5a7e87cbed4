use crate::context::EngineContext;
use crate::keyframe::{Keyframe, KeyframeId};
use crate::timeline::Timeline;

/// A keyframe participating in the current frame.
#[derive(Debug, Clone)]
pub struct ActiveEntry {
    pub keyframe: Keyframe,
    pub layer: i32,
}

/// Ordered set of participating keyframes, at most one entry per identity.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedState {
    entries: Vec<ActiveEntry>,
}

impl AccumulatedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `keyframe` at `layer`, or move its existing entry to `layer`.
    pub fn upsert(&mut self, keyframe: Keyframe, layer: i32) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.keyframe.id() == keyframe.id())
        {
            Some(entry) => {
                entry.keyframe = keyframe;
                entry.layer = layer;
            }
            None => self.entries.push(ActiveEntry { keyframe, layer }),
        }
    }

    pub fn remove(&mut self, id: KeyframeId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.keyframe.id() != id);
        self.entries.len() != before
    }

    pub fn retain(&mut self, keep: impl FnMut(&ActiveEntry) -> bool) {
        self.entries.retain(keep);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActiveEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ActiveEntry> {
        self.entries.iter_mut()
    }

    pub fn entries(&self) -> &[ActiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: KeyframeId) -> bool {
        self.entries.iter().any(|entry| entry.keyframe.id() == id)
    }

    pub fn keyframes(&self) -> impl Iterator<Item = &Keyframe> {
        self.entries.iter().map(|entry| &entry.keyframe)
    }

    fn sort_by_layer(&mut self) {
        self.entries.sort_by_key(|entry| entry.layer);
    }
}

impl<'a> IntoIterator for &'a AccumulatedState {
    type Item = &'a ActiveEntry;
    type IntoIter = std::slice::Iter<'a, ActiveEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Evaluate which keyframes participate at `frame`.
///
/// Every keyframe with `time <= frame` runs its action chain in time order;
/// the result is ordered by layer, equal layers keeping accumulation order.
pub fn compute_active_state(
    timeline: &mut Timeline,
    frame: i64,
    ctx: &EngineContext,
) -> AccumulatedState {
    let mut state = AccumulatedState::new();
    for keyframe in timeline.ordered_view() {
        if keyframe.time() > frame {
            break;
        }
        state = keyframe.apply_actions(state, ctx, frame);
    }
    state.sort_by_layer();
    state
}
